//! SQLite-backed shared cache store.
//!
//! One file shared by every relay instance on the host. A single table holds
//! both cache rows and advisory lock rows; locks are plain rows whose key is
//! `<cache_type>_lock`, created with `INSERT` so concurrent acquirers race on
//! the primary key instead of an application-level mutex. A lock row's `data`
//! column carries the acquirer's owner id, which fences release.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};

use crate::application::ports::{CacheStore, LockToken, StoreError, lock_key};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS shared_cache (
    cache_type TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
)";

/// Shared cache store over a SQLite file.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: Pool<Sqlite>,
}

impl SqliteCacheStore {
    /// Open (and create if missing) the shared cache database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Connection(e.to_string()))?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
                .map_err(|e| StoreError::Connection(e.to_string()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(path = %path.display(), "shared cache database opened");

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Delete `cache_type`'s row only if it is still expired as of `now`.
    ///
    /// A peer may upsert a fresh payload between our read and this delete;
    /// the expiry predicate leaves such a row in place.
    async fn delete_if_expired(&self, cache_type: &str, now: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM shared_cache WHERE cache_type = ? AND expires_at <= ?")
            .bind(cache_type)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, cache_type: &str) -> Result<Option<String>, StoreError> {
        let now = Self::now_ms();
        let row = sqlx::query(
            "SELECT data, expires_at FROM shared_cache WHERE cache_type = ?",
        )
        .bind(cache_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let expires_at: i64 = row
                    .try_get("expires_at")
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                if expires_at <= now {
                    // Lazy expiry: delete and report a miss.
                    self.delete_if_expired(cache_type, now).await?;
                    return Ok(None);
                }
                let data: String = row
                    .try_get("data")
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(data))
            }
        }
    }

    async fn set(&self, cache_type: &str, payload: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Self::now_ms();
        let expires_at = now + i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT INTO shared_cache (cache_type, data, created_at, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(cache_type) DO UPDATE SET
                 data = excluded.data,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at",
        )
        .bind(cache_type)
        .bind(payload)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn try_acquire_lock(
        &self,
        cache_type: &str,
        lease: Duration,
    ) -> Result<Option<LockToken>, StoreError> {
        let key = lock_key(cache_type);
        let now = Self::now_ms();
        let expires_at = now + i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
        let owner = format!("{:016x}", rand::random::<u64>());

        // Stale leases are reclaimed in the same statement: the insert wins
        // either when no lock row exists or when the existing one expired.
        let result = sqlx::query(
            "INSERT INTO shared_cache (cache_type, data, created_at, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(cache_type) DO UPDATE SET
                 data = excluded.data,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at
             WHERE shared_cache.expires_at <= ?",
        )
        .bind(&key)
        .bind(&owner)
        .bind(now)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(Some(LockToken::new(owner)))
        } else {
            Ok(None)
        }
    }

    async fn release_lock(&self, cache_type: &str, token: &LockToken) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM shared_cache WHERE cache_type = ? AND data = ?")
            .bind(lock_key(cache_type))
            .bind(token.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_misses_on_empty_store() {
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        assert_eq!(store.get("tokens").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_within_ttl() {
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        store
            .set("tokens", "tok-1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("tokens").await.unwrap().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        store
            .set("results", "stale", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("results").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_existing_entry() {
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        store
            .set("tokens", "old", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("tokens", "new", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("tokens").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn lazy_expiry_spares_unexpired_rows() {
        // The expiry delete re-checks the predicate, so a payload written
        // after the expired read (by a peer instance) survives it.
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        store
            .set("tokens", "fresh", Duration::from_secs(60))
            .await
            .unwrap();

        let stale_observation = SqliteCacheStore::now_ms();
        store
            .delete_if_expired("tokens", stale_observation)
            .await
            .unwrap();

        assert_eq!(store.get("tokens").await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        let token = store
            .try_acquire_lock("tokens", Duration::from_secs(30))
            .await
            .unwrap()
            .expect("first acquire should win");
        assert!(
            store
                .try_acquire_lock("tokens", Duration::from_secs(30))
                .await
                .unwrap()
                .is_none()
        );

        store.release_lock("tokens", &token).await.unwrap();
        assert!(
            store
                .try_acquire_lock("tokens", Duration::from_secs(30))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable() {
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        assert!(
            store
                .try_acquire_lock("results", Duration::from_millis(10))
                .await
                .unwrap()
                .is_some()
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(
            store
                .try_acquire_lock("results", Duration::from_secs(30))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn stale_token_cannot_release_successor_lock() {
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        let stale = store
            .try_acquire_lock("tokens", Duration::from_millis(10))
            .await
            .unwrap()
            .expect("first acquire should win");

        tokio::time::sleep(Duration::from_millis(30)).await;
        let successor = store
            .try_acquire_lock("tokens", Duration::from_secs(30))
            .await
            .unwrap()
            .expect("expired lease should be reclaimable");

        // The outlived holder's release is a no-op against the new owner.
        store.release_lock("tokens", &stale).await.unwrap();
        assert!(
            store
                .try_acquire_lock("tokens", Duration::from_secs(30))
                .await
                .unwrap()
                .is_none()
        );

        store.release_lock("tokens", &successor).await.unwrap();
        assert!(
            store
                .try_acquire_lock("tokens", Duration::from_secs(30))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn lock_row_does_not_shadow_cache_row() {
        let store = SqliteCacheStore::open_in_memory().await.unwrap();
        store
            .set("tokens", "tok-1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(
            store
                .try_acquire_lock("tokens", Duration::from_secs(30))
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(store.get("tokens").await.unwrap().as_deref(), Some("tok-1"));
    }
}
