//! Session Token Provider
//!
//! HTTP adapter for the provider's token-minting endpoint. The endpoint takes
//! the long-lived account credential and answers with a short-lived session
//! token that the feed accepts as a connection parameter.
//!
//! Response shape:
//!
//! ```json
//! {"success": true, "data": {"jsessionId": "abc123..."}}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::application::ports::{SessionToken, TokenError, TokenProvider};
use crate::infrastructure::config::Credentials;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct AuthResponse {
    success: bool,
    data: Option<AuthData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    #[serde(rename = "jsessionId")]
    jsession_id: String,
}

/// Token provider backed by the provider's auth endpoint.
pub struct HttpTokenProvider {
    client: Client,
    url: String,
    credentials: Credentials,
}

impl HttpTokenProvider {
    /// Create a provider for the given endpoint and credentials.
    pub fn new(url: String, credentials: Credentials) -> Result<Self, TokenError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url,
            credentials,
        })
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> Result<SessionToken, TokenError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "action": "generate-tokens",
                "accountId": self.credentials.account_id(),
                "secret": self.credentials.secret(),
            }))
            .send()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Rejected(format!("http status {status}")));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        if !body.success {
            return Err(TokenError::Rejected(
                body.error.unwrap_or_else(|| "unknown auth failure".to_string()),
            ));
        }

        let data = body
            .data
            .ok_or_else(|| TokenError::Malformed("missing data in auth response".to_string()))?;

        if data.jsession_id.is_empty() {
            return Err(TokenError::Malformed("empty session token".to_string()));
        }

        tracing::debug!("session token minted");
        Ok(SessionToken::new(data.jsession_id))
    }
}
