//! Reconciliation of ServiceAccounts.

use super::{ObjectKey, Phase, ReconcileError, ReconcileOutcome, Reconciler, ResourceKind, TriggerSource};
use crate::observability::metrics;
use crate::secret::Freshness;
use crate::service_account::{apply_patch, needs_patch};
use std::time::Instant;
use tracing::{debug, info, Instrument};

impl Reconciler {
    /// Make sure the registry secret exists in the ServiceAccount's namespace
    /// and that the ServiceAccount references it
    ///
    /// Never reschedules on success; the next notification for the
    /// ServiceAccount, or its admission, re-evaluates it.
    pub async fn reconcile_service_account(
        &self,
        key: &ObjectKey,
        trigger: TriggerSource,
    ) -> ReconcileOutcome {
        let span = tracing::info_span!(
            "reconcile.service_account",
            resource.namespace = %key.namespace,
            resource.name = %key.name,
            trigger = trigger.as_str(),
        );

        async move {
            let started = Instant::now();
            metrics::increment_reconciliations(ResourceKind::ServiceAccount.as_str());

            let outcome = self.reconcile_service_account_inner(key).await;

            metrics::observe_reconciliation_duration(
                ResourceKind::ServiceAccount.as_str(),
                started.elapsed().as_secs_f64(),
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn reconcile_service_account_inner(&self, key: &ObjectKey) -> ReconcileOutcome {
        let service_account = match self.fetch(self.service_accounts.as_ref(), key).await {
            Err(error) => return self.failed(Phase::FetchFailed, error),
            Ok(None) => {
                debug!("ServiceAccount no longer exists");
                return ReconcileOutcome::done(Phase::NotFound);
            }
            Ok(Some(service_account)) => service_account,
        };

        if let Err(error) = self
            .synchronizer
            .ensure_current(&key.namespace, Freshness::Exists)
            .await
        {
            return self.failed(Phase::SyncFailed, error.into());
        }

        if !needs_patch(&service_account) {
            debug!("ServiceAccount already references the registry secret");
            return ReconcileOutcome::done(Phase::NoChange);
        }

        let patched = apply_patch(&service_account);
        let written = match self
            .bounded(
                key,
                "update",
                self.service_accounts.update(&key.namespace, &patched),
            )
            .await
        {
            Ok(written) => written,
            Err(error) => return self.failed(Phase::WriteFailed, error),
        };

        match written {
            Ok(_) => {
                metrics::increment_service_account_patches();
                info!("Added registry secret to ServiceAccount image pull secrets");
                ReconcileOutcome::done(Phase::Patched)
            }
            Err(source) if source.is_not_found() => {
                debug!("ServiceAccount was deleted before it could be patched");
                ReconcileOutcome::done(Phase::NotFound)
            }
            Err(source) => self.failed(
                Phase::WriteFailed,
                ReconcileError::Write {
                    key: key.clone(),
                    source,
                },
            ),
        }
    }
}
