//! History fetcher port.

use async_trait::async_trait;

use super::token::SessionToken;
use crate::domain::event::HistoryEntry;

/// Errors from the history fetcher.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The history endpoint could not be reached.
    #[error("history request failed: {0}")]
    Request(String),

    /// The provider answered with an error code.
    #[error("history rejected by provider: {0}")]
    Rejected(String),

    /// The history response could not be decoded.
    #[error("malformed history response: {0}")]
    Malformed(String),
}

/// Upstream collaborator serving the statistic history of settled games.
///
/// Like token generation this is an expensive, rate-limited call; callers go
/// through the shared cache so at most one poll per results TTL is in flight
/// fleet-wide.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// Fetch the most recent settled games, most recent first.
    async fn fetch_history(&self, token: &SessionToken)
    -> Result<Vec<HistoryEntry>, HistoryError>;
}
