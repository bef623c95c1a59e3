//! Downstream Wire Protocol
//!
//! Tagged JSON messages exchanged with downstream clients over the relay
//! WebSocket. Inbound messages are answered or forwarded; outbound messages
//! carry connection status, interpreted feed events, and errors.
//!
//! ```text
//! client: {"type":"ping"}
//! server: {"type":"pong","timestamp":1700000000000}
//! client: {"type":"bet","payload":{...}}
//! server: {"type":"event","event":{"event":"game_result","game_id":"g1","number":7,"color":"red"}}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::event::DomainEvent;

/// Messages accepted from downstream clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe, answered in place.
    Ping,
    /// A bet to forward verbatim to the upstream feed.
    Bet {
        /// The raw bet payload.
        payload: serde_json::Value,
    },
    /// A generic command to forward verbatim to the upstream feed.
    Command {
        /// The raw command payload.
        payload: serde_json::Value,
    },
}

/// Messages sent to downstream clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Answer to a client ping.
    Pong {
        /// Server time in epoch milliseconds.
        timestamp: i64,
    },
    /// The upstream feed connection is open.
    Connected,
    /// The upstream feed connection dropped; reconnection is in progress.
    Disconnected,
    /// An upstream reconnect attempt is being made.
    Reconnecting {
        /// Attempt number (1-based).
        attempt: u32,
    },
    /// An interpreted feed event.
    Event {
        /// The typed event.
        event: DomainEvent,
    },
    /// A non-fatal error.
    Error {
        /// Human-readable description.
        message: String,
    },
}
