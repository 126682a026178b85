//! # Reconciler Tests
//!
//! Secret and ServiceAccount reconciliation against in-memory stores.

mod common;

use common::{harness, pull_secret_names, service_account, FailingProvider, StaticProvider};
use registry_secret_manager::constants::REGISTRY_SECRET_NAME;
use registry_secret_manager::controller::reconciler::{
    ObjectKey, Phase, ReconcileError, TriggerSource,
};
use registry_secret_manager::secret::sync::new_secret;
use registry_secret_manager::store::memory::Operation;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_service_account_with_registry_secret_is_left_alone() {
    let h = harness(vec![Arc::new(StaticProvider::docker_hub())]);
    h.secrets
        .insert("team-a", new_secret("team-a", b"{}".to_vec(), "earlier"));
    let seeded = h.service_accounts.insert(
        "team-a",
        service_account("builder", Some(&[REGISTRY_SECRET_NAME][..])),
    );

    let outcome = h
        .reconciler
        .reconcile_service_account(
            &ObjectKey::new("team-a", "builder"),
            TriggerSource::WatchEvent,
        )
        .await;

    assert_eq!(outcome.phase, Phase::NoChange);
    assert!(outcome.is_success());
    assert_eq!(outcome.requeue_after, None);
    assert_eq!(h.service_accounts.updates(), 0);
    assert_eq!(
        h.service_accounts
            .peek("team-a", "builder")
            .unwrap()
            .metadata
            .resource_version,
        seeded.metadata.resource_version
    );
}

#[tokio::test]
async fn test_service_account_gains_registry_secret_after_existing_ones() {
    let h = harness(vec![Arc::new(StaticProvider::docker_hub())]);
    h.service_accounts
        .insert("team-a", service_account("builder", Some(&["other"][..])));

    let outcome = h
        .reconciler
        .reconcile_service_account(
            &ObjectKey::new("team-a", "builder"),
            TriggerSource::WatchEvent,
        )
        .await;

    assert_eq!(outcome.phase, Phase::Patched);
    assert_eq!(
        pull_secret_names(&h.service_accounts.peek("team-a", "builder").unwrap()),
        ["other", REGISTRY_SECRET_NAME]
    );
    assert!(
        h.secrets.peek("team-a", REGISTRY_SECRET_NAME).is_some(),
        "The referenced secret is created first"
    );
}

#[tokio::test]
async fn test_service_account_without_pull_secrets_gets_one() {
    let h = harness(vec![Arc::new(StaticProvider::docker_hub())]);
    h.service_accounts
        .insert("team-a", service_account("default", None));

    let outcome = h
        .reconciler
        .reconcile_service_account(
            &ObjectKey::new("team-a", "default"),
            TriggerSource::WatchEvent,
        )
        .await;

    assert_eq!(outcome.phase, Phase::Patched);
    assert_eq!(
        pull_secret_names(&h.service_accounts.peek("team-a", "default").unwrap()),
        [REGISTRY_SECRET_NAME]
    );
}

#[tokio::test]
async fn test_missing_service_account_stops_without_error() {
    let h = harness(vec![Arc::new(StaticProvider::docker_hub())]);

    let outcome = h
        .reconciler
        .reconcile_service_account(&ObjectKey::new("team-a", "gone"), TriggerSource::WatchEvent)
        .await;

    assert_eq!(outcome.phase, Phase::NotFound);
    assert!(outcome.is_success());
    assert_eq!(outcome.requeue_after, None);
    assert!(h.secrets.is_empty(), "Nothing is created for a deleted object");
}

#[tokio::test]
async fn test_sync_failure_requeues_after_error_interval() {
    let h = harness(vec![Arc::new(FailingProvider)]);
    h.service_accounts
        .insert("team-a", service_account("builder", None));

    let outcome = h
        .reconciler
        .reconcile_service_account(
            &ObjectKey::new("team-a", "builder"),
            TriggerSource::WatchEvent,
        )
        .await;

    assert_eq!(outcome.phase, Phase::SyncFailed);
    assert!(matches!(outcome.error, Some(ReconcileError::Sync(_))));
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(60)));
    assert_eq!(h.service_accounts.updates(), 0, "No patch without the secret");
}

#[tokio::test]
async fn test_service_account_write_failure_requeues() {
    let h = harness(vec![Arc::new(StaticProvider::docker_hub())]);
    h.service_accounts
        .insert("team-a", service_account("builder", None));
    h.service_accounts
        .fail_next(Operation::Update, "connection reset");

    let outcome = h
        .reconciler
        .reconcile_service_account(
            &ObjectKey::new("team-a", "builder"),
            TriggerSource::WatchEvent,
        )
        .await;

    assert_eq!(outcome.phase, Phase::WriteFailed);
    assert!(outcome.error.as_ref().is_some_and(ReconcileError::is_transient));
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(60)));

    let retried = h
        .reconciler
        .reconcile_service_account(
            &ObjectKey::new("team-a", "builder"),
            TriggerSource::RetryAfterError,
        )
        .await;
    assert_eq!(retried.phase, Phase::Patched);
}

#[tokio::test]
async fn test_secret_refresh_reschedules_after_refresh_interval() {
    let provider = Arc::new(StaticProvider::docker_hub());
    let h = harness(vec![provider.clone()]);
    h.secrets
        .insert("team-a", new_secret("team-a", b"{}".to_vec(), "earlier"));

    let outcome = h
        .reconciler
        .reconcile_secret(
            &ObjectKey::new("team-a", REGISTRY_SECRET_NAME),
            TriggerSource::Timer,
        )
        .await;

    assert_eq!(outcome.phase, Phase::Synchronized);
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(3 * 60 * 60)));
    assert_eq!(provider.logins(), 1, "A refresh always logs in again");
    assert_eq!(h.secrets.updates(), 1);
}

#[tokio::test]
async fn test_missing_secret_stops_refresh_cycle() {
    let provider = Arc::new(StaticProvider::docker_hub());
    let h = harness(vec![provider.clone()]);

    let outcome = h
        .reconciler
        .reconcile_secret(
            &ObjectKey::new("team-a", REGISTRY_SECRET_NAME),
            TriggerSource::Timer,
        )
        .await;

    assert_eq!(outcome.phase, Phase::NotFound);
    assert_eq!(outcome.requeue_after, None);
    assert_eq!(provider.logins(), 0);
    assert!(h.secrets.is_empty(), "A deleted secret is not recreated by its own timer");
}

#[tokio::test]
async fn test_deleted_secret_is_recreated() {
    let provider = Arc::new(StaticProvider::docker_hub());
    let h = harness(vec![provider.clone()]);
    h.service_accounts
        .insert("team-a", service_account("builder", None));
    h.reconciler
        .reconcile_service_account(
            &ObjectKey::new("team-a", "builder"),
            TriggerSource::WatchEvent,
        )
        .await;
    assert!(h.secrets.remove("team-a", REGISTRY_SECRET_NAME).is_some());

    let outcome = h
        .reconciler
        .reconcile_secret(
            &ObjectKey::new("team-a", REGISTRY_SECRET_NAME),
            TriggerSource::Deleted,
        )
        .await;

    assert_eq!(outcome.phase, Phase::Recreated);
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(3 * 60 * 60)));
    assert!(h.secrets.peek("team-a", REGISTRY_SECRET_NAME).is_some());
    assert_eq!(h.secrets.creates(), 2);
    assert_eq!(provider.logins(), 2);
}

#[tokio::test]
async fn test_failed_recreation_retries_as_recreation() {
    let h = harness(vec![Arc::new(FailingProvider)]);

    let outcome = h
        .reconciler
        .reconcile_secret(
            &ObjectKey::new("team-a", REGISTRY_SECRET_NAME),
            TriggerSource::Deleted,
        )
        .await;

    assert_eq!(outcome.phase, Phase::SyncFailed);
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(60)));
    assert_eq!(TriggerSource::Deleted.on_retry(), TriggerSource::Deleted);
    assert_eq!(TriggerSource::Timer.on_retry(), TriggerSource::RetryAfterError);
    assert!(h.secrets.is_empty());
}

#[tokio::test]
async fn test_other_labelled_secrets_are_ignored() {
    let h = harness(vec![Arc::new(StaticProvider::docker_hub())]);

    let outcome = h
        .reconciler
        .reconcile_secret(&ObjectKey::new("team-a", "copied-secret"), TriggerSource::WatchEvent)
        .await;

    assert_eq!(outcome.phase, Phase::Ignored);
    assert_eq!(outcome.requeue_after, None);
}

#[tokio::test]
async fn test_secret_refresh_failure_retries_after_error_interval() {
    let h = harness(vec![Arc::new(FailingProvider)]);
    h.secrets
        .insert("team-a", new_secret("team-a", b"{}".to_vec(), "earlier"));

    let outcome = h
        .reconciler
        .reconcile_secret(
            &ObjectKey::new("team-a", REGISTRY_SECRET_NAME),
            TriggerSource::Timer,
        )
        .await;

    assert_eq!(outcome.phase, Phase::SyncFailed);
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(60)));
    assert_eq!(h.secrets.updates(), 0);
}

#[tokio::test]
async fn test_fetch_failure_is_reported() {
    let h = harness(vec![Arc::new(StaticProvider::docker_hub())]);
    h.service_accounts.fail_next(Operation::Get, "apiserver unavailable");

    let outcome = h
        .reconciler
        .reconcile_service_account(
            &ObjectKey::new("team-a", "builder"),
            TriggerSource::WatchEvent,
        )
        .await;

    assert_eq!(outcome.phase, Phase::FetchFailed);
    assert!(matches!(outcome.error, Some(ReconcileError::Fetch { .. })));
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(60)));
}
