//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration and dependency injection.
pub mod config;

/// Connection multiplexer and downstream wire protocol.
pub mod relay;

/// Downstream HTTP/WebSocket server.
pub mod server;

/// Shared cache store adapters.
pub mod store;

/// Upstream feed adapters (WebSocket client, interpreter, HTTP collaborators).
pub mod upstream;
