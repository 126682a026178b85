//! # Watch Loop
//!
//! Watches managed Secrets and all ServiceAccounts, passes each notification
//! through an [`EventFilter`] and schedules a reconciliation for the keys
//! that pass.
//!
//! Each watch restarts after a short delay when its stream fails or ends.
//! Both stop on SIGINT/SIGTERM, after the readiness probe is cleared.

use crate::constants::{
    APP_NAME, APP_NAME_LABEL, REGISTRY_SECRET_LABEL, REGISTRY_SECRET_LABEL_VALUE,
};
use crate::controller::filter::{EventFilter, Fingerprint};
use crate::controller::reconciler::{ObjectKey, Reconciler, ResourceKind, TriggerSource};
use crate::controller::scheduler::Scheduler;
use crate::runtime::error_policy::handle_watch_stream_error;
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

/// Label selector matching the secrets this controller writes
#[must_use]
pub fn managed_secret_selector() -> String {
    format!("{APP_NAME_LABEL}={APP_NAME},{REGISTRY_SECRET_LABEL}={REGISTRY_SECRET_LABEL_VALUE}")
}

/// Run both watches until a shutdown signal arrives
///
/// # Errors
///
/// Currently always returns `Ok`; watch failures are logged and retried.
pub async fn run_watch_loop(
    client: Client,
    scheduler: Scheduler<Reconciler>,
    server_state: Arc<ServerState>,
    restart_delay: Duration,
) -> Result<(), anyhow::Error> {
    info!("Starting watch loops...");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
        let _ = shutdown_tx.send(true);
    });

    let secrets: Api<Secret> = Api::all(client.clone());
    let secret_config = watcher::Config::default().labels(&managed_secret_selector());
    let service_accounts: Api<ServiceAccount> = Api::all(client);

    server_state.set_ready(true);

    tokio::join!(
        watch_resource(
            secrets,
            secret_config,
            ResourceKind::Secret,
            scheduler.clone(),
            restart_delay,
            shutdown_rx.clone(),
        )
        .instrument(tracing::info_span!("controller.watch", resource.kind = "secret")),
        watch_resource(
            service_accounts,
            watcher::Config::default(),
            ResourceKind::ServiceAccount,
            scheduler,
            restart_delay,
            shutdown_rx,
        )
        .instrument(tracing::info_span!(
            "controller.watch",
            resource.kind = "service_account"
        )),
    );

    info!("Controller stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler, only SIGINT stops the controller: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn watch_resource<K>(
    api: Api<K>,
    config: watcher::Config,
    kind: ResourceKind,
    scheduler: Scheduler<Reconciler>,
    restart_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    K: Resource + Fingerprint + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    // Survives restarts so a relist does not re-trigger every known object
    let mut filter = EventFilter::<K::Print>::new();

    while !*shutdown.borrow() {
        let stream = watcher::watcher(api.clone(), config.clone()).default_backoff();
        futures::pin_mut!(stream);

        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown.changed() => break,
            };
            match next {
                Some(Ok(event)) => {
                    for (key, trigger) in keys_to_schedule(&mut filter, event) {
                        debug!(resource.key = %key, trigger = trigger.as_str(), "watch.event.accepted");
                        scheduler.schedule(kind, key, Duration::ZERO, trigger);
                    }
                }
                Some(Err(e)) => {
                    let pause = handle_watch_stream_error(kind, &e.to_string(), restart_delay);
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
                None => break,
            }
        }

        if *shutdown.borrow() {
            break;
        }
        warn!(
            "Watch stream for {} ended, restarting in {} seconds...",
            kind.as_str(),
            restart_delay.as_secs()
        );
        tokio::select! {
            () = tokio::time::sleep(restart_delay) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!("Watch for {} stopped", kind.as_str());
}

/// Feed one watch event through the filter; returns the keys to reconcile
/// and why
pub fn keys_to_schedule<K>(
    filter: &mut EventFilter<K::Print>,
    event: Event<K>,
) -> Vec<(ObjectKey, TriggerSource)>
where
    K: Resource + Fingerprint,
{
    match event {
        Event::Apply(object) | Event::InitApply(object) => {
            let Some(key) = key_of(&object) else {
                return Vec::new();
            };
            if filter.on_apply(key.clone(), object.fingerprint()) {
                vec![(key, TriggerSource::WatchEvent)]
            } else {
                Vec::new()
            }
        }
        Event::Delete(object) => {
            let Some(key) = key_of(&object) else {
                return Vec::new();
            };
            filter.on_delete(&key);
            if K::RECREATE_ON_DELETE {
                vec![(key, TriggerSource::Deleted)]
            } else {
                Vec::new()
            }
        }
        Event::Init => {
            filter.begin_relist();
            Vec::new()
        }
        Event::InitDone => {
            let forgotten = filter.end_relist();
            if !forgotten.is_empty() {
                debug!(
                    count = forgotten.len(),
                    "Forgot objects deleted while the watch was down"
                );
            }
            Vec::new()
        }
    }
}

fn key_of<K: Resource>(object: &K) -> Option<ObjectKey> {
    Some(ObjectKey::new(object.namespace()?, object.name_any()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::LocalObjectReference;
    use kube::api::ObjectMeta;

    fn service_account(name: &str, pull_secrets: &[&str]) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            image_pull_secrets: Some(
                pull_secrets
                    .iter()
                    .map(|name| LocalObjectReference {
                        name: (*name).to_string(),
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_selector_matches_managed_labels() {
        assert_eq!(
            managed_secret_selector(),
            "app.kubernetes.io/name=registry-secret-manager,registry-secret=true"
        );
    }

    #[test]
    fn test_initial_list_schedules_every_object_once() {
        let mut filter = EventFilter::new();

        assert!(keys_to_schedule(&mut filter, Event::<ServiceAccount>::Init).is_empty());
        assert_eq!(
            keys_to_schedule(&mut filter, Event::InitApply(service_account("default", &[]))),
            vec![(ObjectKey::new("team-a", "default"), TriggerSource::WatchEvent)]
        );
        assert!(keys_to_schedule(&mut filter, Event::<ServiceAccount>::InitDone).is_empty());

        assert!(
            keys_to_schedule(&mut filter, Event::Apply(service_account("default", &[]))).is_empty(),
            "Unchanged object after the list is ignored"
        );
        assert_eq!(
            keys_to_schedule(
                &mut filter,
                Event::Apply(service_account("default", &["other"]))
            ),
            vec![(ObjectKey::new("team-a", "default"), TriggerSource::WatchEvent)]
        );
        assert!(
            keys_to_schedule(
                &mut filter,
                Event::Delete(service_account("default", &["other"]))
            )
            .is_empty(),
            "Deleted ServiceAccounts are left alone"
        );
    }

    #[test]
    fn test_secret_updates_do_not_schedule() {
        let mut filter = EventFilter::new();

        assert_eq!(
            keys_to_schedule(&mut filter, Event::Apply(secret("registry-secret"))),
            vec![(ObjectKey::new("team-a", "registry-secret"), TriggerSource::WatchEvent)]
        );
        assert!(keys_to_schedule(&mut filter, Event::Apply(secret("registry-secret"))).is_empty());
    }

    #[test]
    fn test_secret_delete_schedules_recreation() {
        let mut filter = EventFilter::new();
        keys_to_schedule(&mut filter, Event::Apply(secret("registry-secret")));

        assert_eq!(
            keys_to_schedule(&mut filter, Event::Delete(secret("registry-secret"))),
            vec![(ObjectKey::new("team-a", "registry-secret"), TriggerSource::Deleted)]
        );
        assert!(filter.is_empty());
        assert_eq!(
            keys_to_schedule(&mut filter, Event::Apply(secret("registry-secret"))),
            vec![(ObjectKey::new("team-a", "registry-secret"), TriggerSource::WatchEvent)],
            "The recreated secret is a new object again"
        );
    }

    #[test]
    fn test_objects_without_namespace_are_skipped() {
        let mut filter = EventFilter::new();
        let mut account = service_account("default", &[]);
        account.metadata.namespace = None;

        assert!(keys_to_schedule(&mut filter, Event::Apply(account)).is_empty());
        assert!(filter.is_empty());
    }
}
