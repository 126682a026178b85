//! # Reconciler
//!
//! Maps watch notifications, timers and admission requests onto the secret
//! synchronizer and the pull secret policy.
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the object named by the key (gone means stop, no error)
//! 2. Ensure the namespace's registry secret (refreshed for secrets, merely
//!    present for ServiceAccounts)
//! 3. For ServiceAccounts, add the pull secret reference when it is missing
//! 4. Report an outcome: stop, reschedule after the refresh interval, or
//!    retry after the error interval
//!
//! Every function here returns a value; the watch loop and the webhook
//! handler only translate those values into scheduling and HTTP responses.

pub mod admission;
pub mod secret;
pub mod service_account;
pub mod types;

pub use admission::AdmissionDecision;
pub use types::{ObjectKey, Phase, ReconcileError, ReconcileOutcome, ResourceKind, TriggerSource};

use crate::provider::RegistryProvider;
use crate::secret::SecretSynchronizer;
use crate::store::ObjectStore;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Timing knobs for reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// How often the managed secret is re-logged-in and rewritten
    pub refresh_interval: Duration,
    /// Fixed delay before retrying a failed attempt
    pub error_requeue: Duration,
    /// Bound for each login and cluster API call
    pub operation_timeout: Duration,
    /// Bound for the whole ensure-secret step of an admission review
    pub admission_timeout: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(crate::constants::DEFAULT_REFRESH_INTERVAL_SECS),
            error_requeue: Duration::from_secs(
                crate::constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            ),
            operation_timeout: Duration::from_secs(crate::constants::DEFAULT_OPERATION_TIMEOUT_SECS),
            admission_timeout: Duration::from_secs(crate::constants::DEFAULT_ADMISSION_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    synchronizer: Arc<SecretSynchronizer>,
    secrets: Arc<dyn ObjectStore<Secret>>,
    service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
    settings: ReconcilerSettings,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("synchronizer", &self.synchronizer)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        secrets: Arc<dyn ObjectStore<Secret>>,
        service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
        registries: Vec<Arc<dyn RegistryProvider>>,
        settings: ReconcilerSettings,
    ) -> Self {
        let synchronizer = Arc::new(SecretSynchronizer::new(
            Arc::clone(&secrets),
            registries,
            settings.operation_timeout,
        ));
        Self {
            synchronizer,
            secrets,
            service_accounts,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    #[must_use]
    pub fn synchronizer(&self) -> &SecretSynchronizer {
        &self.synchronizer
    }

    /// Read `key` from `store`, treating a missing object as `None`
    async fn fetch<K>(
        &self,
        store: &dyn ObjectStore<K>,
        key: &ObjectKey,
    ) -> Result<Option<K>, ReconcileError>
    where
        K: Send + Sync,
    {
        match self
            .bounded(key, "fetch", store.get(&key.namespace, &key.name))
            .await?
        {
            Ok(object) => Ok(object),
            Err(source) if source.is_not_found() => Ok(None),
            Err(source) => Err(ReconcileError::Fetch {
                key: key.clone(),
                source,
            }),
        }
    }

    async fn bounded<T>(
        &self,
        key: &ObjectKey,
        operation: &'static str,
        future: impl Future<Output = T>,
    ) -> Result<T, ReconcileError> {
        tokio::time::timeout(self.settings.operation_timeout, future)
            .await
            .map_err(|_elapsed| ReconcileError::TimedOut {
                key: key.clone(),
                operation,
                timeout: self.settings.operation_timeout,
            })
    }

    fn failed(&self, phase: Phase, error: ReconcileError) -> ReconcileOutcome {
        ReconcileOutcome::failed(phase, error, self.settings.error_requeue)
    }
}
