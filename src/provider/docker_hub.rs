//! # Docker Hub
//!
//! Static credentials for Docker Hub (or any registry using plain
//! username/password auth), read from the environment on every login.

use super::{AuthError, Credentials, RegistryProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub const DOCKER_HUB_NAME: &str = "docker-hub";

pub const DOCKER_HUB_USERNAME_ENV: &str = "DOCKER_HUB_USERNAME";
pub const DOCKER_HUB_PASSWORD_ENV: &str = "DOCKER_HUB_PASSWORD";
pub const DOCKER_HUB_ENDPOINT_ENV: &str = "DOCKER_HUB_ENDPOINT";

/// Source of environment values
///
/// `None` means the variable is not set at all, which is reported
/// differently from a variable set to the empty string.
pub trait EnvSource: Send + Sync + std::fmt::Debug {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct DockerHub {
    env: Arc<dyn EnvSource>,
}

impl DockerHub {
    #[must_use]
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self { env }
    }

    fn required(&self, key: &str) -> Result<String, AuthError> {
        match self.env.var(key) {
            None => Err(AuthError::MissingEnv(key.to_string())),
            Some(value) if value.is_empty() => Err(AuthError::EmptyEnv(key.to_string())),
            Some(value) => Ok(value),
        }
    }
}

#[async_trait]
impl RegistryProvider for DockerHub {
    fn name(&self) -> &'static str {
        DOCKER_HUB_NAME
    }

    async fn login(&self) -> Result<Credentials, AuthError> {
        let username = self.required(DOCKER_HUB_USERNAME_ENV)?;
        let password = self.required(DOCKER_HUB_PASSWORD_ENV)?;
        let endpoint = self.required(DOCKER_HUB_ENDPOINT_ENV)?;

        Ok(Credentials::new(username, password, endpoint))
    }
}
