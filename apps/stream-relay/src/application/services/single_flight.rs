//! Single-Flight Cache
//!
//! Funnels every instance's reads of an expensive upstream artifact (session
//! token, history snapshot) through the shared store, which acts both as a
//! TTL cache and as an advisory lease lock. At most one real upstream fetch
//! per cache type is in flight across the whole fleet; other callers observe
//! bounded staleness (the cache TTL) and bounded wait (one fixed retry
//! interval), never a duplicate fetch and never an unbounded loop.
//!
//! Lease semantics: the lock row has its own bounded lifetime, so a holder
//! that crashes mid-fetch leaves a lock that expires on its own and the next
//! caller acquires it as if it were absent.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{CacheStore, StoreError};

/// Default lease lifetime for the advisory lock row.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(30);

/// Default wait before a non-acquiring caller re-reads the cache.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(2500);

/// Tuning for the lock read path.
#[derive(Debug, Clone, Copy)]
pub struct SingleFlightConfig {
    /// Lifetime of the advisory lock row; an older lock is considered free
    /// regardless of holder liveness.
    pub lock_lease: Duration,
    /// How long a non-acquiring caller waits before re-reading the cache.
    pub retry_wait: Duration,
}

impl Default for SingleFlightConfig {
    fn default() -> Self {
        Self {
            lock_lease: DEFAULT_LOCK_LEASE,
            retry_wait: DEFAULT_RETRY_WAIT,
        }
    }
}

/// Errors surfaced by the single-flight read path.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another instance is generating this artifact right now; retryable.
    #[error("concurrent generation in progress for '{cache_type}'")]
    GenerationInProgress {
        /// The contended cache type.
        cache_type: String,
    },

    /// The real upstream fetch failed while we held the lock; retryable.
    #[error("upstream fetch failed: {0}")]
    FetchFailed(String),
}

impl CacheError {
    /// Whether the caller may simply retry later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GenerationInProgress { .. } | Self::FetchFailed(_)
        )
    }
}

/// Cache-or-fetch front end over the shared store.
pub struct SingleFlightCache {
    store: Arc<dyn CacheStore>,
    config: SingleFlightConfig,
}

impl SingleFlightCache {
    /// Create a cache over the given store with default lease tuning.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_config(store, SingleFlightConfig::default())
    }

    /// Create a cache with explicit lease tuning.
    #[must_use]
    pub const fn with_config(store: Arc<dyn CacheStore>, config: SingleFlightConfig) -> Self {
        Self { store, config }
    }

    /// Read `cache_type`, fetching through the lease lock on a miss.
    ///
    /// Cache hits return immediately and never contend. On a miss, the
    /// acquiring caller runs `fetch`, stores the payload on success, and
    /// releases the lock on every exit path. Non-acquiring callers wait one
    /// retry interval and re-read; a second miss surfaces
    /// [`CacheError::GenerationInProgress`].
    pub async fn get_or_fetch<F, Fut>(
        &self,
        cache_type: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<String, CacheError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<String, CacheError>> + Send,
    {
        if let Some(hit) = self.store.get(cache_type).await? {
            tracing::debug!(cache_type, "cache hit");
            return Ok(hit);
        }

        if let Some(lock) = self
            .store
            .try_acquire_lock(cache_type, self.config.lock_lease)
            .await?
        {
            tracing::debug!(cache_type, "cache miss, lock acquired, fetching");
            let result = fetch().await;

            if let Ok(payload) = &result {
                if let Err(error) = self.store.set(cache_type, payload, ttl).await {
                    tracing::warn!(cache_type, %error, "failed to store fetched payload");
                }
            }

            // Release on success and failure alike; a leaked lock would
            // stall every instance until the lease expires.
            if let Err(error) = self.store.release_lock(cache_type, &lock).await {
                tracing::warn!(cache_type, %error, "failed to release lock");
            }

            return result;
        }

        tracing::debug!(
            cache_type,
            wait_ms = self.config.retry_wait.as_millis() as u64,
            "lock held elsewhere, waiting for holder"
        );
        tokio::time::sleep(self.config.retry_wait).await;

        if let Some(hit) = self.store.get(cache_type).await? {
            return Ok(hit);
        }

        Err(CacheError::GenerationInProgress {
            cache_type: cache_type.to_string(),
        })
    }
}
