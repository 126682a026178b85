//! The managed registry secret: payload encoding and synchronization.

pub mod docker_config;
pub mod sync;

pub use docker_config::DockerConfig;
pub use sync::{Freshness, SecretSynchronizer, SyncError, SyncOutcome};
