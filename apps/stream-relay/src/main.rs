//! Stream Relay Binary
//!
//! Starts the live game feed relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stream-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `RELAY_PROVIDER_ACCOUNT_ID`: Provider account id
//! - `RELAY_PROVIDER_SECRET`: Provider secret
//! - `RELAY_FEED_URL`: Live feed WebSocket URL
//! - `RELAY_AUTH_URL`: Token-minting endpoint
//! - `RELAY_HISTORY_URL`: Statistic-history endpoint
//!
//! ## Optional
//! - `RELAY_PORT`: HTTP/WebSocket listen port (default: 8081)
//! - `RELAY_CACHE_DB_PATH`: Shared cache database file (default: shared-cache.db)
//! - `RELAY_TOKEN_TTL_SECS`: Session token cache TTL (default: 480)
//! - `RELAY_RESULTS_TTL_SECS`: History snapshot cache TTL (default: 15)
//! - `RELAY_IDLE_TIMEOUT_SECS`: Session idle eviction threshold (default: 600)
//! - `RUST_LOG`: Log level (default: info)

use std::path::Path;
use std::sync::Arc;

use stream_relay::application::services::{ArtifactTtls, SharedArtifacts, SingleFlightConfig};
use stream_relay::infrastructure::relay::Multiplexer;
use stream_relay::infrastructure::server::{RelayServer, ServerState};
use stream_relay::infrastructure::store::SqliteCacheStore;
use stream_relay::infrastructure::upstream::{
    FeedClientConfig, FeedConnector, HttpHistoryFetcher, HttpTokenProvider,
};
use stream_relay::RelayConfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Stream Relay");

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Shared cache store and the single-flight artifact reader over it
    let store = Arc::new(SqliteCacheStore::open(Path::new(&config.cache.db_path)).await?);
    let token_provider = Arc::new(HttpTokenProvider::new(
        config.feed.auth_url.clone(),
        config.credentials.clone(),
    )?);
    let history_fetcher = Arc::new(HttpHistoryFetcher::new(config.feed.history_url.clone())?);
    let artifacts = Arc::new(SharedArtifacts::new(
        store,
        token_provider,
        history_fetcher,
        SingleFlightConfig {
            lock_lease: config.cache.lock_lease,
            retry_wait: config.cache.lock_retry_wait,
        },
        ArtifactTtls {
            token: config.cache.token_ttl,
            results: config.cache.results_ttl,
        },
    ));

    // Per-identity feed connections
    let connector = Arc::new(FeedConnector::new(FeedClientConfig::from_settings(
        &config.feed,
        config.session.command_capacity,
    )));

    let multiplexer = Arc::new(Multiplexer::new(
        artifacts,
        connector,
        config.session.idle_timeout,
    ));

    // Idle session sweeper
    let sweeper_multiplexer = Arc::clone(&multiplexer);
    let sweeper_cancel = shutdown_token.clone();
    let sweep_interval = config.session.idle_sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = sweeper_cancel.cancelled() => break,
                _ = interval.tick() => {
                    let swept = sweeper_multiplexer.sweep_idle();
                    if swept > 0 {
                        tracing::info!(swept, "idle sessions swept");
                    }
                }
            }
        }
    });

    // Downstream server
    let server_state = Arc::new(ServerState::new(
        Arc::clone(&multiplexer),
        config.session.outbound_capacity,
    ));
    let server = RelayServer::new(config.server.port, server_state, shutdown_token.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    tracing::info!("Stream relay ready");

    await_shutdown(shutdown_token).await;
    multiplexer.shutdown();
    let _ = server_handle.await;

    tracing::info!("Stream relay stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        port = config.server.port,
        cache_db = %config.cache.db_path,
        token_ttl_secs = config.cache.token_ttl.as_secs(),
        results_ttl_secs = config.cache.results_ttl.as_secs(),
        idle_timeout_secs = config.session.idle_timeout.as_secs(),
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
