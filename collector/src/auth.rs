use crate::config::Config;
use crate::errors::{Error, Result};
use crate::model::AccessToken;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::fmt;
use tracing::{debug, error, info};

/// API key and secret for the client-credentials grant
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(Error::CredentialsMissing("DANFOSS_API_KEY"))?;
        let api_secret = config
            .api_secret
            .clone()
            .ok_or(Error::CredentialsMissing("DANFOSS_API_SECRET"))?;

        Ok(Self::new(api_key, api_secret))
    }

    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.api_key, self.api_secret);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Exchanges the credentials for a bearer token. One attempt per run.
pub async fn authenticate(
    client: &reqwest::Client,
    token_url: &str,
    credentials: &Credentials,
) -> Result<AccessToken> {
    debug!("Requesting access token from {}", token_url);

    let response = client
        .post(token_url)
        .header(AUTHORIZATION, credentials.basic_auth_header())
        .header(ACCEPT, "application/json")
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(|e| Error::AuthFailed(format!("token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::AuthFailed(format!("could not read token response: {}", e)))?;

    if !status.is_success() {
        error!("Token endpoint returned {}: {}", status, body);
        return Err(Error::AuthFailed(format!("token endpoint returned {}", status)));
    }

    let token: AccessToken = serde_json::from_str(&body)
        .map_err(|e| Error::AuthFailed(format!("unparsable token response: {}", e)))?;

    if token.value.is_empty() {
        error!("Could not retrieve access token: {}", body);
        return Err(Error::AuthFailed("empty access token".to_string()));
    }

    info!(
        "Access token acquired (type={}, expires_in={}s)",
        token.token_type, token.expires_in_seconds
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(key: Option<&str>, secret: Option<&str>) -> Config {
        let mut config = Config::from_lookup(|_| None);
        config.api_key = key.map(str::to_string);
        config.api_secret = secret.map(str::to_string);
        config
    }

    #[test]
    fn test_basic_auth_header() {
        let credentials = Credentials::new("key", "secret");
        // base64("key:secret")
        assert_eq!(credentials.basic_auth_header(), "Basic a2V5OnNlY3JldA==");
    }

    #[test]
    fn test_missing_key() {
        let err = Credentials::from_config(&config_with(None, Some("secret"))).unwrap_err();
        assert!(matches!(err, Error::CredentialsMissing("DANFOSS_API_KEY")));
    }

    #[test]
    fn test_missing_secret() {
        let err = Credentials::from_config(&config_with(Some("key"), None)).unwrap_err();
        assert!(matches!(err, Error::CredentialsMissing("DANFOSS_API_SECRET")));
    }

    #[test]
    fn test_debug_is_redacted() {
        let credentials = Credentials::new("key-123", "secret-456");
        let printed = format!("{:?}", credentials);
        assert!(!printed.contains("key-123"));
        assert!(!printed.contains("secret-456"));
    }

    #[test]
    fn test_unreachable_endpoint_is_auth_failure() {
        tokio_test::block_on(async {
            let client = reqwest::Client::new();
            let credentials = Credentials::new("key", "secret");

            // Port 1 on loopback refuses connections.
            let err = authenticate(&client, "http://127.0.0.1:1/oauth2/token", &credentials)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::AuthFailed(_)));
        });
    }
}
