//! Configuration Module
//!
//! Configuration loading and dependency injection for the relay service.

mod settings;

pub use settings::{
    CacheSettings, ConfigError, Credentials, FeedSettings, RelayConfig, ServerSettings,
    SessionSettings,
};
