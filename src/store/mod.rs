//! # Object Store
//!
//! Minimal read/create/update surface over cluster objects.
//!
//! The synchronizer and reconciler only ever need these three calls, so they
//! are written against [`ObjectStore`] instead of `kube::Api` directly. The
//! production implementation is [`KubeStore`]; [`MemoryStore`] keeps objects
//! in process with real resource-version semantics for tests and dry runs.

use async_trait::async_trait;
use thiserror::Error;

pub mod cluster;
pub mod memory;

pub use self::cluster::KubeStore;
pub use self::memory::MemoryStore;

/// Failure of a single store call
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("cluster API request failed: {0}")]
    Transport(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Namespaced object storage
///
/// `create` fails with [`StoreError::AlreadyExists`] when the name is taken.
/// `update` carries the object's `resourceVersion` and fails with
/// [`StoreError::Conflict`] when it is stale and [`StoreError::NotFound`]
/// when the object is gone.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    async fn update(&self, namespace: &str, object: &K) -> Result<K, StoreError>;
}
