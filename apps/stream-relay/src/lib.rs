#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Stream Relay - Live Game Feed Multiplexer
//!
//! A relay service that gives each downstream user their own authenticated
//! connection to a live game provider's WebSocket feed, interprets the
//! provider's mixed JSON/tag protocol into typed events, and shares the
//! expensive artifacts (session tokens, recent-results history) across every
//! relay instance through a TTL cache with an advisory lease lock.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Typed feed events and the wheel color function
//!   - `event`: `DomainEvent`, `HistoryEntry`, `color_of`
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Cache store, token provider, history fetcher, upstream connector
//!   - `services`: Single-flight cache read path, shared artifact reads
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `upstream`: Feed WebSocket client, frame interpreter, HTTP collaborators
//!   - `relay`: Identity-keyed session multiplexer and downstream protocol
//!   - `store`: SQLite and in-memory cache store adapters
//!   - `server`: axum WebSocket/HTTP surface
//!   - `config`: Configuration loading
//!
//! # Data Flow
//!
//! ```text
//! Provider feed WS ──► FeedClient ──► interpret ──┐
//!                        (per user)               ├──► Multiplexer ──► Client WS
//! Auth / history HTTP ──► SharedArtifacts ────────┘     (sessions)
//!        (single-flight through the shared cache)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Typed feed events with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::event::{Color, DomainEvent, HistoryEntry, color_of};

// Application ports and services
pub use application::ports::{
    CacheStore, HistoryFetcher, SessionToken, TokenProvider, UpstreamConnector, UpstreamEvent,
    UpstreamHandle,
};
pub use application::services::{ArtifactTtls, SharedArtifacts, SingleFlightConfig};

// Infrastructure config
pub use infrastructure::config::{
    CacheSettings, ConfigError, Credentials, FeedSettings, RelayConfig, ServerSettings,
    SessionSettings,
};

// Multiplexer and server (for integration tests)
pub use infrastructure::relay::{Multiplexer, RelayStats, SessionStats};
pub use infrastructure::relay::protocol::{ClientMessage, ServerMessage};
pub use infrastructure::server::{RelayServer, RelayServerError, ServerState};

// Store adapters
pub use infrastructure::store::{InMemoryCacheStore, SqliteCacheStore};

// Feed client
pub use infrastructure::upstream::{
    FeedClientConfig, FeedConnector, HttpHistoryFetcher, HttpTokenProvider,
};
