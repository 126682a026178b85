//! Common test utilities
//!
//! Fake registry providers and helpers to wire a [`Reconciler`] over
//! in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LocalObjectReference, Secret, ServiceAccount};
use kube::api::ObjectMeta;
use registry_secret_manager::controller::reconciler::{Reconciler, ReconcilerSettings};
use registry_secret_manager::provider::{AuthError, Credentials, RegistryProvider};
use registry_secret_manager::store::MemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provider that always returns the same credentials
#[derive(Debug)]
pub struct StaticProvider {
    name: &'static str,
    credentials: Credentials,
    logins: AtomicUsize,
}

impl StaticProvider {
    pub fn new(name: &'static str, username: &str, password: &str, endpoint: &str) -> Self {
        Self {
            name,
            credentials: Credentials::new(username, password, endpoint),
            logins: AtomicUsize::new(0),
        }
    }

    pub fn docker_hub() -> Self {
        Self::new("docker-hub", "foo", "bar", "https://index.docker.io/v1/")
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryProvider for StaticProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn login(&self) -> Result<Credentials, AuthError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(self.credentials.clone())
    }
}

/// Provider whose login always fails
#[derive(Debug)]
pub struct FailingProvider;

#[async_trait]
impl RegistryProvider for FailingProvider {
    fn name(&self) -> &'static str {
        "ecr"
    }

    async fn login(&self) -> Result<Credentials, AuthError> {
        Err(AuthError::TokenRequest("ThrottlingException".to_string()))
    }
}

/// Provider that takes `delay` to answer
#[derive(Debug)]
pub struct SlowProvider {
    pub delay: Duration,
}

#[async_trait]
impl RegistryProvider for SlowProvider {
    fn name(&self) -> &'static str {
        "ecr"
    }

    async fn login(&self) -> Result<Credentials, AuthError> {
        tokio::time::sleep(self.delay).await;
        Ok(Credentials::new(
            "AWS",
            "token",
            "https://123456789012.dkr.ecr.eu-west-1.amazonaws.com",
        ))
    }
}

pub struct Harness {
    pub secrets: Arc<MemoryStore<Secret>>,
    pub service_accounts: Arc<MemoryStore<ServiceAccount>>,
    pub reconciler: Arc<Reconciler>,
}

pub fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        refresh_interval: Duration::from_secs(3 * 60 * 60),
        error_requeue: Duration::from_secs(60),
        operation_timeout: Duration::from_secs(30),
        admission_timeout: Duration::from_secs(5),
    }
}

pub fn harness(registries: Vec<Arc<dyn RegistryProvider>>) -> Harness {
    let secrets = Arc::new(MemoryStore::<Secret>::new());
    let service_accounts = Arc::new(MemoryStore::<ServiceAccount>::new());
    let reconciler = Arc::new(Reconciler::new(
        secrets.clone(),
        service_accounts.clone(),
        registries,
        settings(),
    ));
    Harness {
        secrets,
        service_accounts,
        reconciler,
    }
}

pub fn service_account(name: &str, pull_secrets: Option<&[&str]>) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        image_pull_secrets: pull_secrets.map(|names| {
            names
                .iter()
                .map(|name| LocalObjectReference {
                    name: (*name).to_string(),
                })
                .collect()
        }),
        ..Default::default()
    }
}

pub fn pull_secret_names(service_account: &ServiceAccount) -> Vec<String> {
    service_account
        .image_pull_secrets
        .iter()
        .flatten()
        .map(|reference| reference.name.clone())
        .collect()
}
