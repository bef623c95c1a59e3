//! Cache store port.

use std::time::Duration;

use async_trait::async_trait;

/// Errors from the cache store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying store failed.
    #[error("store query failed: {0}")]
    Query(String),

    /// The store connection failed.
    #[error("store connection failed: {0}")]
    Connection(String),
}

/// Proof of lease ownership handed out by [`CacheStore::try_acquire_lock`].
///
/// Release is fenced on the token: a holder whose lease expired and was
/// reclaimed by a peer can no longer delete the peer's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    owner: String,
}

impl LockToken {
    /// Wrap an owner id.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    /// Get the owner id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.owner
    }
}

/// Durable key/value store shared by every relay instance.
///
/// The store doubles as a TTL cache and an advisory lease-lock primitive:
/// one row per cache type plus one per `<cache_type>_lock`. An expired row
/// (cache or lock) is treated as absent, which makes leases self-healing
/// when a holder crashes before releasing.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the payload for `cache_type`.
    ///
    /// Returns `None` on a miss. An expired entry is deleted lazily and
    /// reported as a miss; it is never served past its `expires_at`.
    async fn get(&self, cache_type: &str) -> Result<Option<String>, StoreError>;

    /// Upsert the payload for `cache_type` with `expires_at = now + ttl`.
    async fn set(&self, cache_type: &str, payload: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Try to create the `<cache_type>_lock` record with the given lease.
    ///
    /// Returns `None` when a non-expired lock already exists. An expired
    /// lock is overwritten as if it were absent. The returned token is the
    /// only thing that can release the lease.
    async fn try_acquire_lock(
        &self,
        cache_type: &str,
        lease: Duration,
    ) -> Result<Option<LockToken>, StoreError>;

    /// Delete the `<cache_type>_lock` record if `token` still owns it.
    ///
    /// Called on every exit path of the critical section that acquired it.
    /// A token whose lease was reclaimed by a peer releases nothing.
    async fn release_lock(&self, cache_type: &str, token: &LockToken) -> Result<(), StoreError>;
}

/// Key under which the advisory lock row for `cache_type` is stored.
#[must_use]
pub fn lock_key(cache_type: &str) -> String {
    format!("{cache_type}_lock")
}
