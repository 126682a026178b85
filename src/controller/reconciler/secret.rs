//! Reconciliation of the managed registry secret.

use super::{ObjectKey, Phase, ReconcileOutcome, Reconciler, ResourceKind, TriggerSource};
use crate::constants::REGISTRY_SECRET_NAME;
use crate::observability::metrics;
use crate::secret::{Freshness, SyncError, SyncOutcome};
use std::time::Instant;
use tracing::{debug, info, Instrument};

impl Reconciler {
    /// Refresh the registry secret named by `key`
    ///
    /// Succeeds with a reschedule after the refresh interval. A missing secret
    /// stops without error, unless the run was started by its deletion: then
    /// the secret is created again and the refresh cycle resumes. A namespace
    /// that is gone ends the recreation.
    pub async fn reconcile_secret(
        &self,
        key: &ObjectKey,
        trigger: TriggerSource,
    ) -> ReconcileOutcome {
        let span = tracing::info_span!(
            "reconcile.secret",
            resource.namespace = %key.namespace,
            resource.name = %key.name,
            trigger = trigger.as_str(),
        );

        async move {
            let started = Instant::now();
            metrics::increment_reconciliations(ResourceKind::Secret.as_str());

            let outcome = self.reconcile_secret_inner(key, trigger).await;

            metrics::observe_reconciliation_duration(
                ResourceKind::Secret.as_str(),
                started.elapsed().as_secs_f64(),
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn reconcile_secret_inner(
        &self,
        key: &ObjectKey,
        trigger: TriggerSource,
    ) -> ReconcileOutcome {
        if key.name != REGISTRY_SECRET_NAME {
            debug!("Ignoring labelled secret that is not the registry secret");
            return ReconcileOutcome::done(Phase::Ignored);
        }

        match self.fetch(self.secrets.as_ref(), key).await {
            Err(error) => return self.failed(Phase::FetchFailed, error),
            Ok(None) if trigger == TriggerSource::Deleted => {
                return self.recreate_secret(key).await;
            }
            Ok(None) => {
                debug!("Registry secret no longer exists");
                return ReconcileOutcome::done(Phase::NotFound);
            }
            Ok(Some(_)) => {}
        }

        match self
            .synchronizer
            .ensure_current(&key.namespace, Freshness::Fresh)
            .await
        {
            Ok(SyncOutcome::Vanished) => ReconcileOutcome::done(Phase::NotFound),
            Ok(outcome) => {
                info!(
                    outcome = outcome.as_str(),
                    next_refresh_secs = self.settings.refresh_interval.as_secs(),
                    "Registry secret synchronized"
                );
                ReconcileOutcome::requeue(Phase::Synchronized, self.settings.refresh_interval)
            }
            Err(error) => self.failed(Phase::SyncFailed, error.into()),
        }
    }

    async fn recreate_secret(&self, key: &ObjectKey) -> ReconcileOutcome {
        match self
            .synchronizer
            .ensure_current(&key.namespace, Freshness::Exists)
            .await
        {
            Ok(outcome) => {
                info!(outcome = outcome.as_str(), "Registry secret recreated after deletion");
                ReconcileOutcome::requeue(Phase::Recreated, self.settings.refresh_interval)
            }
            Err(SyncError::Create(error)) if error.is_not_found() => {
                debug!("Namespace is gone, not recreating the registry secret");
                ReconcileOutcome::done(Phase::NotFound)
            }
            Err(error) => self.failed(Phase::SyncFailed, error.into()),
        }
    }
}
