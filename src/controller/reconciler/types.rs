//! # Types
//!
//! Core types for the reconciler.

use crate::secret::SyncError;
use crate::store::StoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Namespaced identity of a watched object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of object a reconciliation runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Secret,
    ServiceAccount,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "secret",
            ResourceKind::ServiceAccount => "service_account",
        }
    }
}

/// Why a reconciliation was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Watch notification for the object
    WatchEvent,
    /// Periodic refresh of the managed secret
    Timer,
    /// Retry after a failed attempt
    RetryAfterError,
    /// The managed secret was deleted and has to be put back
    Deleted,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::WatchEvent => "watch-event",
            TriggerSource::Timer => "timer",
            TriggerSource::RetryAfterError => "retry-after-error",
            TriggerSource::Deleted => "deleted",
        }
    }

    /// Trigger for the retry of a failed attempt; a recreation keeps
    /// recreating until it succeeds
    #[must_use]
    pub fn on_retry(self) -> Self {
        match self {
            TriggerSource::Deleted => TriggerSource::Deleted,
            _ => TriggerSource::RetryAfterError,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to fetch {key}: {source}")]
    Fetch {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    #[error("failed to synchronize registry secret: {0}")]
    Sync(#[from] SyncError),

    #[error("failed to write {key}: {source}")]
    Write {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    #[error("{operation} for {key} did not finish within {timeout:?}")]
    TimedOut {
        key: ObjectKey,
        operation: &'static str,
        timeout: Duration,
    },
}

impl ReconcileError {
    /// Errors expected to clear without intervention (conflicts, timeouts,
    /// transport hiccups). Permanent ones, like a bad registry login, still
    /// retry but are logged louder.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Fetch { source, .. } | ReconcileError::Write { source, .. } => {
                source.is_conflict() || matches!(source, StoreError::Transport(_))
            }
            ReconcileError::Sync(error) => error.is_transient(),
            ReconcileError::TimedOut { .. } => true,
        }
    }
}

/// Terminal state of one reconciliation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The watched object no longer exists
    NotFound,
    /// The object is not one this controller manages
    Ignored,
    /// The managed secret is present and, for secrets, freshly written
    Synchronized,
    /// The managed secret was deleted by someone else and created again
    Recreated,
    /// The ServiceAccount already references the managed secret
    NoChange,
    /// The ServiceAccount was updated to reference the managed secret
    Patched,
    FetchFailed,
    SyncFailed,
    WriteFailed,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotFound => "not-found",
            Phase::Ignored => "ignored",
            Phase::Synchronized => "synchronized",
            Phase::Recreated => "recreated",
            Phase::NoChange => "no-change",
            Phase::Patched => "patched",
            Phase::FetchFailed => "fetch-failed",
            Phase::SyncFailed => "sync-failed",
            Phase::WriteFailed => "write-failed",
        }
    }
}

/// Result of one reconciliation attempt, consumed by the scheduler
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub requeue_after: Option<Duration>,
    pub error: Option<ReconcileError>,
    pub phase: Phase,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn done(phase: Phase) -> Self {
        Self {
            requeue_after: None,
            error: None,
            phase,
        }
    }

    #[must_use]
    pub fn requeue(phase: Phase, after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
            error: None,
            phase,
        }
    }

    #[must_use]
    pub fn failed(phase: Phase, error: ReconcileError, retry_after: Duration) -> Self {
        Self {
            requeue_after: Some(retry_after),
            error: Some(error),
            phase,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
