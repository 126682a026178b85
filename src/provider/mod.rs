//! # Registry Providers
//!
//! Credential sources for the container registries the controller manages.
//!
//! Each provider implements [`RegistryProvider`], turning its own way of
//! authenticating (static environment values, a cloud token exchange) into a
//! uniform [`Credentials`] record. Providers never cache: every `login()` call
//! performs a fresh login so that periodic reconciliation picks up rotated
//! credentials.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub mod docker_hub;
pub mod ecr;

pub use docker_hub::{DockerHub, EnvSource, ProcessEnv};
pub use ecr::Ecr;

/// Credentials for a single registry endpoint
///
/// Produced fresh by every login and dropped right after the payload is
/// encoded. The password is wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
    endpoint: String,
}

impl Credentials {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Login failure reported by a provider
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("could not find environment value for {0}")]
    MissingEnv(String),

    #[error("found empty environment value for {0}")]
    EmptyEnv(String),

    #[error("failed to get authorization token: {0}")]
    TokenRequest(String),

    #[error("malformed authorization token: {0}")]
    MalformedToken(String),
}

/// Provider trait for container registry credentials
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    /// Registry brand, used in logs and metrics
    fn name(&self) -> &'static str;

    /// Perform a fresh login and return the resulting credentials
    async fn login(&self) -> Result<Credentials, AuthError>;
}

/// Registry brands that can be enabled through configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    DockerHub,
    Ecr,
}

impl RegistryKind {
    pub const ALL: [RegistryKind; 2] = [RegistryKind::DockerHub, RegistryKind::Ecr];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryKind::DockerHub => docker_hub::DOCKER_HUB_NAME,
            RegistryKind::Ecr => ecr::ECR_NAME,
        }
    }

    /// Documented credential lifetime for the registry, if it expires
    #[must_use]
    pub fn token_lifetime(&self) -> Option<Duration> {
        match self {
            RegistryKind::DockerHub => None,
            RegistryKind::Ecr => Some(ecr::ECR_TOKEN_LIFETIME),
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegistryKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| s.to_string())
    }
}

/// Options shared by provider constructors
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// AWS region for ECR; falls back to the SDK default chain when unset
    pub aws_region: Option<String>,
}

/// Build one provider per enabled registry, preserving configuration order
pub async fn build_registries(
    kinds: &[RegistryKind],
    options: &ProviderOptions,
) -> Vec<Arc<dyn RegistryProvider>> {
    let mut registries: Vec<Arc<dyn RegistryProvider>> = Vec::with_capacity(kinds.len());
    for kind in kinds {
        tracing::info!(registry = %kind, "Enabling registry provider");
        match kind {
            RegistryKind::DockerHub => {
                registries.push(Arc::new(DockerHub::new(Arc::new(ProcessEnv))));
            }
            RegistryKind::Ecr => {
                registries.push(Arc::new(Ecr::new(options.aws_region.as_deref()).await));
            }
        }
    }
    registries
}
