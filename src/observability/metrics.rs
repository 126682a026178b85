//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `registry_secret_manager_reconciliations_total` - Reconciliations by object kind
//! - `registry_secret_manager_reconciliation_errors_total` - Failed reconciliations by object kind
//! - `registry_secret_manager_reconciliation_duration_seconds` - Reconciliation duration by object kind
//! - `registry_secret_manager_registry_logins_total` - Registry logins by registry and result
//! - `registry_secret_manager_registry_login_duration_seconds` - Registry login duration
//! - `registry_secret_manager_secret_writes_total` - Managed secret creates and updates
//! - `registry_secret_manager_service_account_patches_total` - ServiceAccounts patched by the reconciler
//! - `registry_secret_manager_admission_decisions_total` - Admission decisions by decision

use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_secret_manager_reconciliations_total",
            "Total number of reconciliations by object kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_secret_manager_reconciliation_errors_total",
            "Total number of reconciliation errors by object kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "registry_secret_manager_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds by object kind",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REGISTRY_LOGINS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_secret_manager_registry_logins_total",
            "Total number of registry logins by registry and result",
        ),
        &["registry", "result"],
    )
    .expect("Failed to create REGISTRY_LOGINS_TOTAL metric - this should never happen")
});

static REGISTRY_LOGIN_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "registry_secret_manager_registry_login_duration_seconds",
            "Duration of registry logins in seconds",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["registry"],
    )
    .expect("Failed to create REGISTRY_LOGIN_DURATION metric - this should never happen")
});

static SECRET_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_secret_manager_secret_writes_total",
            "Total number of managed secret creates and updates by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create SECRET_WRITES_TOTAL metric - this should never happen")
});

static SERVICE_ACCOUNT_PATCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "registry_secret_manager_service_account_patches_total",
        "Total number of ServiceAccounts patched by the reconciler",
    )
    .expect("Failed to create SERVICE_ACCOUNT_PATCHES_TOTAL metric - this should never happen")
});

static ADMISSION_DECISIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_secret_manager_admission_decisions_total",
            "Total number of admission decisions by decision",
        ),
        &["decision"],
    )
    .expect("Failed to create ADMISSION_DECISIONS_TOTAL metric - this should never happen")
});

/// Register all metrics with the process registry
///
/// # Errors
///
/// Fails if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REGISTRY_LOGINS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REGISTRY_LOGIN_DURATION.clone()))?;
    REGISTRY.register(Box::new(SECRET_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SERVICE_ACCOUNT_PATCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMISSION_DECISIONS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn record_registry_login(registry: &str, success: bool, duration: f64) {
    let result = if success { "success" } else { "error" };
    REGISTRY_LOGINS_TOTAL
        .with_label_values(&[registry, result])
        .inc();
    REGISTRY_LOGIN_DURATION
        .with_label_values(&[registry])
        .observe(duration);
}

pub fn increment_secret_writes(operation: &str) {
    SECRET_WRITES_TOTAL.with_label_values(&[operation]).inc();
}

/// Current count of secret writes for `operation`
#[must_use]
pub fn secret_writes(operation: &str) -> u64 {
    SECRET_WRITES_TOTAL.with_label_values(&[operation]).get()
}

pub fn increment_service_account_patches() {
    SERVICE_ACCOUNT_PATCHES_TOTAL.inc();
}

pub fn increment_admission_decisions(decision: &str) {
    ADMISSION_DECISIONS_TOTAL.with_label_values(&[decision]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_labels_independently() {
        let before_ecr = REGISTRY_LOGINS_TOTAL
            .with_label_values(&["ecr", "success"])
            .get();
        let before_hub = REGISTRY_LOGINS_TOTAL
            .with_label_values(&["docker-hub", "error"])
            .get();

        record_registry_login("ecr", true, 0.2);

        assert_eq!(
            REGISTRY_LOGINS_TOTAL
                .with_label_values(&["ecr", "success"])
                .get(),
            before_ecr + 1
        );
        assert_eq!(
            REGISTRY_LOGINS_TOTAL
                .with_label_values(&["docker-hub", "error"])
                .get(),
            before_hub,
            "Other label sets are untouched"
        );
    }
}
