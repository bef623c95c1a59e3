//! Session token provider port.

use async_trait::async_trait;

/// Opaque upstream session token with a provider-declared lifetime.
///
/// How the token is produced (the auth chain) is an external collaborator's
/// concern; the relay only carries it as a connection parameter.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
}

impl SessionToken {
    /// Wrap a raw token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors from the token provider.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The auth endpoint could not be reached.
    #[error("auth request failed: {0}")]
    Request(String),

    /// The auth endpoint answered but refused to issue a token.
    #[error("token generation rejected: {0}")]
    Rejected(String),

    /// The auth response could not be decoded.
    #[error("malformed auth response: {0}")]
    Malformed(String),
}

/// Upstream auth collaborator producing session tokens.
///
/// Consumed as a black box: given the configured long-lived credential it
/// returns a fresh session token or fails. Callers are expected to funnel
/// through the shared cache so the whole fleet generates at most one token
/// per cache TTL.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Generate a fresh session token.
    async fn fetch_token(&self) -> Result<SessionToken, TokenError>;
}
