//! # Error Policy
//!
//! Reporting for failed reconciliations and classification of watch stream
//! errors. Retry timing itself is fixed (the error requeue interval) and
//! lives in the reconciler's outcome.

use crate::controller::reconciler::{ObjectKey, ReconcileOutcome, ResourceKind};
use crate::observability::metrics;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Log and count the error carried by `outcome`, if any
pub fn report_outcome(kind: ResourceKind, key: &ObjectKey, outcome: &ReconcileOutcome) {
    let Some(reconcile_error) = &outcome.error else {
        debug!(
            resource.kind = kind.as_str(),
            resource.key = %key,
            phase = outcome.phase.as_str(),
            requeue_after = ?outcome.requeue_after,
            "reconciliation.finished"
        );
        return;
    };

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.kind = kind.as_str(),
        resource.namespace = key.namespace.as_str(),
        resource.name = key.name.as_str(),
        phase = outcome.phase.as_str(),
        error = %reconcile_error
    );
    let _error_guard = error_span.enter();

    let retry_in = outcome.requeue_after.map_or(0, |after| after.as_secs());
    if reconcile_error.is_transient() {
        warn!(
            "Reconciliation of {} {} failed, retrying in {}s: {}",
            kind.as_str(),
            key,
            retry_in,
            reconcile_error
        );
    } else {
        error!(
            "Reconciliation of {} {} failed, retrying in {}s: {:?}",
            kind.as_str(),
            key,
            retry_in,
            reconcile_error
        );
    }
    metrics::increment_reconciliation_errors(kind.as_str());
}

/// How the watch loop should treat a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// Credentials or RBAC problem
    Unauthorized,
    /// The resource version is too old; the watcher relists on its own
    Expired,
    /// The API server asked us to slow down
    Throttled,
    /// The watched resource type is unknown to the API server
    NotFound,
    Other,
}

impl WatchErrorClass {
    #[must_use]
    pub fn classify(error_string: &str) -> Self {
        // 404 first: a plain text 404 surfaces as a serde error mentioning WatchFailed
        let is_not_found = error_string.contains("ObjectNotFound")
            || error_string.contains("404")
            || error_string.contains("not found");
        if is_not_found {
            WatchErrorClass::NotFound
        } else if error_string.contains("401") || error_string.contains("Unauthorized") {
            WatchErrorClass::Unauthorized
        } else if error_string.contains("410")
            || error_string.contains("too old resource version")
            || error_string.contains("Expired")
            || error_string.contains("Gone")
        {
            WatchErrorClass::Expired
        } else if error_string.contains("429")
            || error_string.contains("storage is (re)initializing")
            || error_string.contains("TooManyRequests")
        {
            WatchErrorClass::Throttled
        } else {
            WatchErrorClass::Other
        }
    }
}

/// Log a watch stream error and return how long to pause before polling the
/// stream again
#[must_use]
pub fn handle_watch_stream_error(
    kind: ResourceKind,
    error_string: &str,
    restart_delay: Duration,
) -> Duration {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        resource.kind = kind.as_str(),
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match WatchErrorClass::classify(error_string) {
        WatchErrorClass::Unauthorized => {
            error!(
                "Watch on {} failed with 401 Unauthorized; check the ClusterRole grants list and watch on secrets and serviceaccounts",
                kind.as_str()
            );
            restart_delay
        }
        WatchErrorClass::Expired => {
            warn!(
                error_type = "410",
                "Watch resource version expired, the watch relists"
            );
            Duration::ZERO
        }
        WatchErrorClass::Throttled => {
            warn!(
                error_type = "429",
                "API server throttling watches, backing off {}s",
                restart_delay.as_secs()
            );
            restart_delay
        }
        WatchErrorClass::NotFound => {
            warn!("Watch on {} returned 404: {}", kind.as_str(), error_string);
            restart_delay
        }
        WatchErrorClass::Other => {
            error!("Watch stream error on {}: {}", kind.as_str(), error_string);
            restart_delay
        }
    }
}
