//! Shared Artifacts
//!
//! The two expensive upstream artifacts every instance needs, read through
//! the single-flight cache: the session token used to open feed connections
//! and the statistic-history snapshot of recent settled games.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{
    CacheStore, HistoryFetcher, SessionToken, TokenProvider,
};
use crate::application::services::single_flight::{
    CacheError, SingleFlightCache, SingleFlightConfig,
};
use crate::domain::event::HistoryEntry;

/// Cache type under which session tokens are stored.
pub const TOKEN_CACHE_TYPE: &str = "tokens";

/// Cache type under which history snapshots are stored.
pub const RESULTS_CACHE_TYPE: &str = "results";

/// Default lifetime of a cached session token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(8 * 60);

/// Default lifetime of a cached history snapshot.
pub const DEFAULT_RESULTS_TTL: Duration = Duration::from_secs(15);

/// TTLs for the shared artifacts.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactTtls {
    /// Lifetime of a cached session token.
    pub token: Duration,
    /// Lifetime of a cached history snapshot.
    pub results: Duration,
}

impl Default for ArtifactTtls {
    fn default() -> Self {
        Self {
            token: DEFAULT_TOKEN_TTL,
            results: DEFAULT_RESULTS_TTL,
        }
    }
}

/// Fleet-wide cached access to session tokens and history snapshots.
pub struct SharedArtifacts {
    cache: SingleFlightCache,
    token_provider: Arc<dyn TokenProvider>,
    history_fetcher: Arc<dyn HistoryFetcher>,
    ttls: ArtifactTtls,
}

impl SharedArtifacts {
    /// Wire the artifact reader over its store and upstream collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        token_provider: Arc<dyn TokenProvider>,
        history_fetcher: Arc<dyn HistoryFetcher>,
        single_flight: SingleFlightConfig,
        ttls: ArtifactTtls,
    ) -> Self {
        Self {
            cache: SingleFlightCache::with_config(store, single_flight),
            token_provider,
            history_fetcher,
            ttls,
        }
    }

    /// Get a session token, generating one through the lease lock on a miss.
    pub async fn session_token(&self) -> Result<SessionToken, CacheError> {
        let provider = self.token_provider.clone();
        let value = self
            .cache
            .get_or_fetch(TOKEN_CACHE_TYPE, self.ttls.token, move || async move {
                let token = provider
                    .fetch_token()
                    .await
                    .map_err(|e| CacheError::FetchFailed(e.to_string()))?;
                Ok(token.as_str().to_string())
            })
            .await?;
        Ok(SessionToken::new(value))
    }

    /// Get the recent-results snapshot, polling the provider on a miss.
    ///
    /// A snapshot is stored as its JSON encoding so every instance decodes
    /// the same payload the holder fetched.
    pub async fn history_snapshot(&self) -> Result<Vec<HistoryEntry>, CacheError> {
        let payload = self
            .cache
            .get_or_fetch(RESULTS_CACHE_TYPE, self.ttls.results, || async {
                // The history endpoint is authenticated; the token read goes
                // through its own cache key, so holding the results lock here
                // cannot deadlock against it.
                let token = self.session_token().await?;
                let entries = self
                    .history_fetcher
                    .fetch_history(&token)
                    .await
                    .map_err(|e| CacheError::FetchFailed(e.to_string()))?;
                serde_json::to_string(&entries)
                    .map_err(|e| CacheError::FetchFailed(e.to_string()))
            })
            .await?;

        serde_json::from_str(&payload)
            .map_err(|e| CacheError::FetchFailed(format!("corrupt cached snapshot: {e}")))
    }
}
