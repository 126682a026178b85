//! Admission-time fast path for ServiceAccounts.

use super::Reconciler;
use crate::observability::metrics;
use crate::secret::{Freshness, SyncError};
use crate::service_account::patch_operations;
use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::ServiceAccount;
use tracing::{debug, warn, Instrument};

/// What to answer for an admitted ServiceAccount
#[derive(Debug)]
pub enum AdmissionDecision {
    /// Already references the registry secret
    Unchanged,
    /// Allow with these additive operations
    Patch(Vec<PatchOperation>),
    /// The registry secret could not be ensured. The request is still
    /// allowed, with whatever patch the object needs.
    DependencyFailed {
        error: SyncError,
        patch: Vec<PatchOperation>,
    },
}

impl AdmissionDecision {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionDecision::Unchanged => "unchanged",
            AdmissionDecision::Patch(_) => "patch",
            AdmissionDecision::DependencyFailed { .. } => "dependency_failed",
        }
    }
}

impl Reconciler {
    /// Decide how to admit `service_account` into `namespace`
    ///
    /// The registry secret is only required to exist, not to be fresh, so a
    /// namespace that already has one never waits on a registry login here.
    /// Ensuring it is cut off after the admission timeout, well before the
    /// API server gives up on the webhook; the ServiceAccount watch creates
    /// the secret later.
    pub async fn admit(&self, namespace: &str, service_account: &ServiceAccount) -> AdmissionDecision {
        let span = tracing::info_span!(
            "admission",
            resource.namespace = %namespace,
            resource.name = service_account.metadata.name.as_deref().unwrap_or(""),
        );

        async move {
            let deadline = self.settings.admission_timeout;
            let ensured = tokio::time::timeout(
                deadline,
                self.synchronizer.ensure_current(namespace, Freshness::Exists),
            )
            .await
            .unwrap_or_else(|_elapsed| {
                Err(SyncError::TimedOut {
                    operation: "ensure registry secret for admission".to_string(),
                    timeout: deadline,
                })
            });
            let patch = patch_operations(service_account);

            let decision = match ensured {
                Err(error) => {
                    warn!(error = %error, "Could not ensure registry secret during admission");
                    AdmissionDecision::DependencyFailed { error, patch }
                }
                Ok(_) if patch.is_empty() => AdmissionDecision::Unchanged,
                Ok(_) => AdmissionDecision::Patch(patch),
            };

            debug!(decision = decision.as_str(), "Admission decided");
            metrics::increment_admission_decisions(decision.as_str());
            decision
        }
        .instrument(span)
        .await
    }
}
