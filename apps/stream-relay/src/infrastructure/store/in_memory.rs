//! In-memory cache store for testing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{CacheStore, LockToken, StoreError, lock_key};

struct Entry {
    data: String,
    expires_at: Instant,
}

/// In-memory implementation of `CacheStore`.
///
/// Same expiry semantics as the durable store, scoped to one process.
/// Suitable for testing and development. Not for production use.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of live (non-expired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Check if the store holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, cache_type: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.write();
        match entries.get(cache_type) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.data.clone())),
            Some(_) => {
                entries.remove(cache_type);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, cache_type: &str, payload: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        entries.insert(
            cache_type.to_string(),
            Entry {
                data: payload.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn try_acquire_lock(
        &self,
        cache_type: &str,
        lease: Duration,
    ) -> Result<Option<LockToken>, StoreError> {
        let key = lock_key(cache_type);
        let now = Instant::now();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&key) {
            if existing.expires_at > now {
                return Ok(None);
            }
        }
        // The lock row's payload is the owner id, which fences release.
        let owner = format!("{:016x}", rand::random::<u64>());
        entries.insert(
            key,
            Entry {
                data: owner.clone(),
                expires_at: now + lease,
            },
        );
        Ok(Some(LockToken::new(owner)))
    }

    async fn release_lock(&self, cache_type: &str, token: &LockToken) -> Result<(), StoreError> {
        let key = lock_key(cache_type);
        let mut entries = self.entries.write();
        if entries.get(&key).is_some_and(|e| e.data == token.as_str()) {
            entries.remove(&key);
        }
        Ok(())
    }
}
