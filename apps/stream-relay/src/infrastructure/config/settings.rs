//! Relay Configuration Settings
//!
//! Configuration types for the stream relay, loaded from environment variables.

use std::time::Duration;

/// Long-lived provider credential used to mint session tokens.
#[derive(Clone)]
pub struct Credentials {
    account_id: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(account_id: String, secret: String) -> Self {
        Self { account_id, secret }
    }

    /// Get the provider account id.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Get the provider secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Upstream feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Base WebSocket URL of the live feed.
    pub url: String,
    /// Authenticated statistic-history endpoint.
    pub history_url: String,
    /// Token-minting endpoint.
    pub auth_url: String,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Silence tolerated after a ping before the connection is declared dead.
    pub pong_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            history_url: String::new(),
            auth_url: String::new(),
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 5,
        }
    }
}

/// Shared cache and lease-lock settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Path of the shared cache database file.
    pub db_path: String,
    /// Lifetime of a cached session token.
    pub token_ttl: Duration,
    /// Lifetime of a cached history snapshot.
    pub results_ttl: Duration,
    /// Lease lifetime of the advisory lock.
    pub lock_lease: Duration,
    /// Wait before a non-acquiring caller re-reads the cache.
    pub lock_retry_wait: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            db_path: "shared-cache.db".to_string(),
            token_ttl: Duration::from_secs(8 * 60),
            results_ttl: Duration::from_secs(15),
            lock_lease: Duration::from_secs(30),
            lock_retry_wait: Duration::from_millis(2500),
        }
    }
}

/// Downstream session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How often idle sessions are swept.
    pub idle_sweep_interval: Duration,
    /// Inactivity span after which a session is evicted.
    pub idle_timeout: Duration,
    /// Capacity of each session's outbound message channel.
    pub outbound_capacity: usize,
    /// Capacity of each session's upstream command channel.
    pub command_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_sweep_interval: Duration::from_secs(5 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
            outbound_capacity: 256,
            command_capacity: 32,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP/WebSocket listen port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8081 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Provider credentials.
    pub credentials: Credentials,
    /// Server port settings.
    pub server: ServerSettings,
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// Shared cache settings.
    pub cache: CacheSettings,
    /// Downstream session settings.
    pub session: SessionSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let account_id = std::env::var("RELAY_PROVIDER_ACCOUNT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("RELAY_PROVIDER_ACCOUNT_ID".to_string()))?;

        let secret = std::env::var("RELAY_PROVIDER_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("RELAY_PROVIDER_SECRET".to_string()))?;

        if account_id.is_empty() {
            return Err(ConfigError::EmptyValue("RELAY_PROVIDER_ACCOUNT_ID".to_string()));
        }

        if secret.is_empty() {
            return Err(ConfigError::EmptyValue("RELAY_PROVIDER_SECRET".to_string()));
        }

        let feed_url = std::env::var("RELAY_FEED_URL")
            .map_err(|_| ConfigError::MissingEnvVar("RELAY_FEED_URL".to_string()))?;

        let auth_url = std::env::var("RELAY_AUTH_URL")
            .map_err(|_| ConfigError::MissingEnvVar("RELAY_AUTH_URL".to_string()))?;

        let history_url = std::env::var("RELAY_HISTORY_URL")
            .map_err(|_| ConfigError::MissingEnvVar("RELAY_HISTORY_URL".to_string()))?;

        let server = ServerSettings {
            port: parse_env_u16("RELAY_PORT", ServerSettings::default().port),
        };

        let feed = FeedSettings {
            url: feed_url,
            history_url,
            auth_url,
            heartbeat_interval: parse_env_duration_secs(
                "RELAY_HEARTBEAT_INTERVAL_SECS",
                FeedSettings::default().heartbeat_interval,
            ),
            pong_timeout: parse_env_duration_secs(
                "RELAY_PONG_TIMEOUT_SECS",
                FeedSettings::default().pong_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                FeedSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                FeedSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "RELAY_RECONNECT_DELAY_MULTIPLIER",
                FeedSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "RELAY_MAX_RECONNECT_ATTEMPTS",
                FeedSettings::default().max_reconnect_attempts,
            ),
        };

        let cache = CacheSettings {
            db_path: std::env::var("RELAY_CACHE_DB_PATH")
                .unwrap_or_else(|_| CacheSettings::default().db_path),
            token_ttl: parse_env_duration_secs(
                "RELAY_TOKEN_TTL_SECS",
                CacheSettings::default().token_ttl,
            ),
            results_ttl: parse_env_duration_secs(
                "RELAY_RESULTS_TTL_SECS",
                CacheSettings::default().results_ttl,
            ),
            lock_lease: parse_env_duration_secs(
                "RELAY_LOCK_LEASE_SECS",
                CacheSettings::default().lock_lease,
            ),
            lock_retry_wait: parse_env_duration_millis(
                "RELAY_LOCK_RETRY_WAIT_MS",
                CacheSettings::default().lock_retry_wait,
            ),
        };

        let session = SessionSettings {
            idle_sweep_interval: parse_env_duration_secs(
                "RELAY_IDLE_SWEEP_INTERVAL_SECS",
                SessionSettings::default().idle_sweep_interval,
            ),
            idle_timeout: parse_env_duration_secs(
                "RELAY_IDLE_TIMEOUT_SECS",
                SessionSettings::default().idle_timeout,
            ),
            outbound_capacity: parse_env_usize(
                "RELAY_OUTBOUND_CAPACITY",
                SessionSettings::default().outbound_capacity,
            ),
            command_capacity: parse_env_usize(
                "RELAY_COMMAND_CAPACITY",
                SessionSettings::default().command_capacity,
            ),
        };

        Ok(Self {
            credentials: Credentials::new(account_id, secret),
            server,
            feed,
            cache,
            session,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
