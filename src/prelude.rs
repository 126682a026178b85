//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use registry_secret_manager::prelude::*;
//! ```

// Providers
pub use crate::provider::{AuthError, Credentials, RegistryKind, RegistryProvider};

// Secret synchronization
pub use crate::secret::{DockerConfig, Freshness, SecretSynchronizer, SyncError, SyncOutcome};

// Cluster object access
pub use crate::store::{KubeStore, MemoryStore, ObjectStore, StoreError};

// Reconciler types
pub use crate::controller::reconciler::{
    AdmissionDecision, ObjectKey, Phase, ReconcileError, ReconcileOutcome, Reconciler,
    ReconcilerSettings, ResourceKind, TriggerSource,
};

// Configuration
pub use crate::config::{ConfigurationError, ControllerConfig};
