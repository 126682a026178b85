//! # Controller
//!
//! Core controller modules for the Registry Secret Manager.
//!
//! - `filter`: Decides which watch notifications trigger a reconciliation
//! - `reconciler`: Core reconciliation and admission logic
//! - `scheduler`: Delayed, de-duplicated and bounded reconciliation runs

pub mod filter;
pub mod reconciler;
pub mod scheduler;
