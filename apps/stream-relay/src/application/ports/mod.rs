//! Application Ports
//!
//! Contracts for the external systems the relay depends on, following the
//! same hexagonal split as the rest of the codebase:
//!
//! - `CacheStore`: durable cross-instance cache and lease-lock store
//! - `TokenProvider`: upstream auth collaborator producing session tokens
//! - `HistoryFetcher`: upstream statistic-history collaborator
//! - `UpstreamConnector`: factory for per-identity live feed connections

mod history;
mod store;
mod token;
mod upstream;

pub use history::{HistoryError, HistoryFetcher};
pub use store::{CacheStore, LockToken, StoreError, lock_key};
pub use token::{SessionToken, TokenError, TokenProvider};
pub use upstream::{
    CommandError, UpstreamConnectError, UpstreamConnector, UpstreamEvent, UpstreamHandle,
};
