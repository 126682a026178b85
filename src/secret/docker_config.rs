//! # Docker Config Codec
//!
//! Builds the `.dockerconfigjson` payload stored in the managed secret:
//!
//! ```json
//! {"auths": {"<endpoint>": {"username": "...", "password": "...", "email": "...", "auth": "..."}}}
//! ```
//!
//! `auth` is `base64(username ":" password)`. Entries are keyed by endpoint,
//! so a later credential for the same endpoint replaces an earlier one, and
//! are serialized in endpoint order so identical input always produces
//! identical bytes.

use crate::constants::DOCKER_CONFIG_EMAIL;
use crate::provider::Credentials;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    pub auths: BTreeMap<String, Authorization>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub username: String,
    pub password: String,
    pub email: String,
    pub auth: String,
}

impl Authorization {
    fn from_credentials(credentials: &Credentials) -> Self {
        let auth = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            credentials.username(),
            credentials.password()
        ));
        Self {
            username: credentials.username().to_string(),
            password: credentials.password().to_string(),
            email: DOCKER_CONFIG_EMAIL.to_string(),
            auth,
        }
    }
}

impl DockerConfig {
    #[must_use]
    pub fn from_credentials<'a>(credentials: impl IntoIterator<Item = &'a Credentials>) -> Self {
        let mut auths = BTreeMap::new();
        for credentials in credentials {
            auths.insert(
                credentials.endpoint().to_string(),
                Authorization::from_credentials(credentials),
            );
        }
        Self { auths }
    }
}

/// Encode credentials into the `.dockerconfigjson` payload
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode<'a>(
    credentials: impl IntoIterator<Item = &'a Credentials>,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&DockerConfig::from_credentials(credentials))
}

/// Parse a `.dockerconfigjson` payload
///
/// # Errors
///
/// Returns an error if the bytes are not a valid payload.
pub fn decode(bytes: &[u8]) -> Result<DockerConfig, serde_json::Error> {
    serde_json::from_slice(bytes)
}
