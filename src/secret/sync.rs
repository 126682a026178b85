//! # Secret Synchronizer
//!
//! Idempotent "ensure the namespace's registry secret exists and is current".
//!
//! No lock guards the secret. Concurrent callers converge because every write
//! is preceded by a read, a lost create race counts as success and an update
//! carries the resource version it read. A provider failure aborts before any
//! write, so a stale-but-valid secret is never replaced by a partial one.

use crate::constants::{
    APP_NAME, APP_NAME_LABEL, DOCKER_CONFIG_JSON_KEY, DOCKER_CONFIG_JSON_TYPE,
    LAST_REFRESH_ANNOTATION, REGISTRY_SECRET_LABEL, REGISTRY_SECRET_LABEL_VALUE,
    REGISTRY_SECRET_NAME,
};
use crate::observability::metrics;
use crate::provider::{AuthError, Credentials, RegistryProvider};
use crate::secret::docker_config;
use crate::store::{ObjectStore, StoreError};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// How current an existing secret has to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Any existing secret is good enough; only create when absent
    Exists,
    /// Log in again and rewrite the payload even when the secret exists
    Fresh,
}

/// What [`SecretSynchronizer::ensure_current`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The secret exists and `Freshness::Exists` was requested; nothing written
    AlreadyExists,
    Created,
    /// Another writer created the secret between our read and our create
    CreatedConcurrently,
    Updated,
    /// The secret was deleted between our read and our update
    Vanished,
}

impl SyncOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::AlreadyExists => "already_exists",
            SyncOutcome::Created => "created",
            SyncOutcome::CreatedConcurrently => "created_concurrently",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Vanished => "vanished",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read registry secret: {0}")]
    Read(#[source] StoreError),

    #[error("failed to log in to registry {registry}: {source}")]
    Auth {
        registry: &'static str,
        #[source]
        source: AuthError,
    },

    #[error("failed to encode registry auth payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to create registry secret: {0}")]
    Create(#[source] StoreError),

    #[error("failed to update registry secret: {0}")]
    Update(#[source] StoreError),

    #[error("{operation} did not finish within {timeout:?}")]
    TimedOut {
        operation: String,
        timeout: Duration,
    },
}

impl SyncError {
    /// Conflicts and timeouts are expected to clear on their own
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Update(error) | SyncError::Create(error) | SyncError::Read(error) => {
                error.is_conflict() || matches!(error, StoreError::Transport(_))
            }
            SyncError::TimedOut { .. } => true,
            SyncError::Auth { .. } | SyncError::Encode(_) => false,
        }
    }
}

pub struct SecretSynchronizer {
    store: Arc<dyn ObjectStore<Secret>>,
    registries: Vec<Arc<dyn RegistryProvider>>,
    operation_timeout: Duration,
}

impl std::fmt::Debug for SecretSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSynchronizer")
            .field(
                "registries",
                &self.registries.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl SecretSynchronizer {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore<Secret>>,
        registries: Vec<Arc<dyn RegistryProvider>>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registries,
            operation_timeout,
        }
    }

    /// Make sure `namespace` holds the registry secret, refreshing its
    /// payload when `freshness` asks for it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` when the read, a login, the encoding or the write
    /// fails, or when any of those exceeds the operation timeout. Nothing is
    /// written when a login fails.
    pub async fn ensure_current(
        &self,
        namespace: &str,
        freshness: Freshness,
    ) -> Result<SyncOutcome, SyncError> {
        let existing = self
            .bounded(
                "read registry secret",
                self.store.get(namespace, REGISTRY_SECRET_NAME),
            )
            .await?
            .map_err(SyncError::Read)?;

        if existing.is_some() && freshness == Freshness::Exists {
            debug!(namespace = %namespace, "Registry secret already exists");
            return Ok(SyncOutcome::AlreadyExists);
        }

        let payload = self.build_payload().await?;
        let refreshed_at = chrono::Utc::now().to_rfc3339();

        let outcome = match existing {
            None => {
                let secret = new_secret(namespace, payload, &refreshed_at);
                match self
                    .bounded(
                        "create registry secret",
                        self.store.create(namespace, &secret),
                    )
                    .await?
                {
                    Ok(_) => {
                        info!(namespace = %namespace, "Created registry secret");
                        SyncOutcome::Created
                    }
                    Err(error) if error.is_already_exists() => {
                        debug!(
                            namespace = %namespace,
                            "Registry secret was created concurrently"
                        );
                        SyncOutcome::CreatedConcurrently
                    }
                    Err(error) => return Err(SyncError::Create(error)),
                }
            }
            Some(current) => {
                let secret = refreshed_secret(current, payload, &refreshed_at);
                match self
                    .bounded(
                        "update registry secret",
                        self.store.update(namespace, &secret),
                    )
                    .await?
                {
                    Ok(_) => {
                        info!(namespace = %namespace, "Refreshed registry secret");
                        SyncOutcome::Updated
                    }
                    Err(error) if error.is_not_found() => {
                        warn!(
                            namespace = %namespace,
                            "Registry secret disappeared before it could be updated"
                        );
                        SyncOutcome::Vanished
                    }
                    Err(error) => return Err(SyncError::Update(error)),
                }
            }
        };

        if matches!(outcome, SyncOutcome::Created | SyncOutcome::Updated) {
            metrics::increment_secret_writes(outcome.as_str());
        }
        Ok(outcome)
    }

    /// Log in to every registry in order and encode the result
    async fn build_payload(&self) -> Result<Vec<u8>, SyncError> {
        let mut credentials: Vec<Credentials> = Vec::with_capacity(self.registries.len());
        for registry in &self.registries {
            let started = Instant::now();
            let result = self
                .bounded(format!("login to {}", registry.name()), registry.login())
                .await;
            let duration = started.elapsed().as_secs_f64();

            match result {
                Ok(Ok(login)) => {
                    metrics::record_registry_login(registry.name(), true, duration);
                    debug!(registry = registry.name(), endpoint = login.endpoint(), "Logged in to registry");
                    credentials.push(login);
                }
                Ok(Err(source)) => {
                    metrics::record_registry_login(registry.name(), false, duration);
                    return Err(SyncError::Auth {
                        registry: registry.name(),
                        source,
                    });
                }
                Err(timed_out) => {
                    metrics::record_registry_login(registry.name(), false, duration);
                    return Err(timed_out);
                }
            }
        }

        Ok(docker_config::encode(&credentials)?)
    }

    async fn bounded<T>(
        &self,
        operation: impl Into<String>,
        future: impl Future<Output = T>,
    ) -> Result<T, SyncError> {
        let operation = operation.into();
        tokio::time::timeout(self.operation_timeout, future)
            .await
            .map_err(|_elapsed| SyncError::TimedOut {
                operation,
                timeout: self.operation_timeout,
            })
    }
}

fn identifying_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_NAME_LABEL.to_string(), APP_NAME.to_string()),
        (
            REGISTRY_SECRET_LABEL.to_string(),
            REGISTRY_SECRET_LABEL_VALUE.to_string(),
        ),
    ])
}

fn payload_data(payload: Vec<u8>) -> BTreeMap<String, ByteString> {
    BTreeMap::from([(DOCKER_CONFIG_JSON_KEY.to_string(), ByteString(payload))])
}

/// Fresh managed secret for `namespace`
#[must_use]
pub fn new_secret(namespace: &str, payload: Vec<u8>, refreshed_at: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(REGISTRY_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(identifying_labels()),
            annotations: Some(BTreeMap::from([(
                LAST_REFRESH_ANNOTATION.to_string(),
                refreshed_at.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
        data: Some(payload_data(payload)),
        ..Default::default()
    }
}

/// `current` with a new payload, keeping its resource version and any
/// labels or annotations added by others
#[must_use]
pub fn refreshed_secret(mut current: Secret, payload: Vec<u8>, refreshed_at: &str) -> Secret {
    current
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(identifying_labels());
    current
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            LAST_REFRESH_ANNOTATION.to_string(),
            refreshed_at.to_string(),
        );
    current.type_ = Some(DOCKER_CONFIG_JSON_TYPE.to_string());
    current.data = Some(payload_data(payload));
    current.string_data = None;
    current
}
