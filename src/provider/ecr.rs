//! # AWS ECR
//!
//! Exchanges the ambient AWS identity for a short-lived ECR authorization
//! token via `GetAuthorizationToken`.
//!
//! The token is `base64("AWS:<password>")`; the username and password are
//! split at the first `:` and paired with the proxy endpoint ECR returns.

use super::{AuthError, Credentials, RegistryProvider};
use async_trait::async_trait;
use aws_sdk_ecr::Client as EcrClient;
use base64::Engine;
use std::time::Duration;
use tracing::debug;

pub const ECR_NAME: &str = "ecr";

/// ECR authorization tokens expire after 12 hours
pub const ECR_TOKEN_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Ecr {
    client: EcrClient,
}

impl Ecr {
    /// Load the AWS SDK config and build an ECR client.
    ///
    /// With `region` unset the SDK default chain applies (`AWS_REGION`,
    /// `AWS_DEFAULT_REGION`, profile).
    pub async fn new(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;

        Self {
            client: EcrClient::new(&sdk_config),
        }
    }
}

#[async_trait]
impl RegistryProvider for Ecr {
    fn name(&self) -> &'static str {
        ECR_NAME
    }

    async fn login(&self) -> Result<Credentials, AuthError> {
        let response = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| {
                AuthError::TokenRequest(aws_sdk_ecr::error::DisplayErrorContext(e).to_string())
            })?;

        let auth_data = response.authorization_data().first().ok_or_else(|| {
            AuthError::MalformedToken("no authorization data returned".to_string())
        })?;

        let token = auth_data.authorization_token().ok_or_else(|| {
            AuthError::MalformedToken("no authorization token in response".to_string())
        })?;
        let endpoint = auth_data.proxy_endpoint().ok_or_else(|| {
            AuthError::MalformedToken("no proxy endpoint in response".to_string())
        })?;

        debug!(endpoint = %endpoint, "Received ECR authorization token");

        parse_authorization_token(token, endpoint)
    }
}

/// Decode an ECR authorization token into credentials for `endpoint`.
///
/// # Errors
///
/// Returns `AuthError::MalformedToken` when the token is not base64, not
/// UTF-8, or has no `:` separator.
pub fn parse_authorization_token(token: &str, endpoint: &str) -> Result<Credentials, AuthError> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(token)
        .map_err(|e| AuthError::MalformedToken(format!("invalid base64: {e}")))?;

    let decoded = String::from_utf8(decoded)
        .map_err(|e| AuthError::MalformedToken(format!("not valid UTF-8: {e}")))?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| AuthError::MalformedToken("missing ':' separator".to_string()))?;

    Ok(Credentials::new(username, password, endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://123456789012.dkr.ecr.eu-west-1.amazonaws.com";

    fn encode(raw: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(raw)
    }

    #[test]
    fn test_parse_splits_at_first_colon() {
        let credentials = parse_authorization_token(&encode("AWS:pa:ss"), ENDPOINT).unwrap();
        assert_eq!(credentials.username(), "AWS");
        assert_eq!(credentials.password(), "pa:ss", "Password keeps later colons");
        assert_eq!(credentials.endpoint(), ENDPOINT);
    }

    #[test]
    fn test_parse_rejects_invalid_base64() {
        assert!(matches!(
            parse_authorization_token("not base64!!", ENDPOINT),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        match parse_authorization_token(&encode("AWSpassword"), ENDPOINT) {
            Err(AuthError::MalformedToken(msg)) => assert!(msg.contains("separator")),
            other => panic!("expected MalformedToken, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_non_utf8() {
        let token = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe, b':', b'x']);
        assert!(matches!(
            parse_authorization_token(&token, ENDPOINT),
            Err(AuthError::MalformedToken(_))
        ));
    }
}
