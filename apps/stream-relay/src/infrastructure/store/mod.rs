//! Shared Cache Store Adapters
//!
//! Implementations of the `CacheStore` port: the SQLite file shared across
//! relay instances, and an in-memory variant for tests.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryCacheStore;
pub use sqlite::SqliteCacheStore;
