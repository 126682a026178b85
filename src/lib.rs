//! Registry Secret Manager Library
//!
//! Keeps a `kubernetes.io/dockerconfigjson` secret named `registry-secret`
//! fresh in every namespace that needs one and attaches it to every
//! ServiceAccount as an image pull secret, through a reconciler driven by
//! watches and timers and a mutating admission webhook.
//!
//! ## Quick Start
//!
//! ```rust
//! use registry_secret_manager::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod cli;
pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod secret;
pub mod server;
pub mod service_account;
pub mod store;
pub mod webhook;
