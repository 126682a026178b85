//! ServiceAccount handling: the pull secret reference policy.

pub mod policy;

pub use policy::{apply_patch, needs_patch, patch_operations};
