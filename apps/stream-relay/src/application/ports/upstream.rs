//! Upstream feed connector port.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::token::SessionToken;
use crate::domain::event::DomainEvent;

/// Events emitted by an upstream feed connection.
///
/// Typed channel replacing string-keyed emitter wiring: the dependency
/// between the feed client and its owner is visible in the signature of
/// [`UpstreamConnector::connect`].
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    /// The feed connection is open.
    Connected,
    /// The feed connection dropped; the client will retry on its own.
    Disconnected,
    /// A reconnect attempt is being made.
    Reconnecting {
        /// Attempt number (1-based).
        attempt: u32,
    },
    /// A typed event interpreted from an inbound frame.
    Event(DomainEvent),
    /// A non-fatal error, forwarded without tearing the session down.
    Error(String),
}

/// Errors returned when sending a command through an [`UpstreamHandle`].
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The upstream socket is not open; commands are never queued.
    #[error("upstream feed not connected")]
    NotConnected,

    /// The command channel is full; the command is dropped, not buffered.
    #[error("upstream command backlog full")]
    Backlogged,
}

/// Errors establishing an upstream connection.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamConnectError {
    /// The connection could not be spawned.
    #[error("upstream connect failed: {0}")]
    Failed(String),
}

/// Owner-side handle to a running upstream feed connection.
///
/// The handle and the connection task share the open flag: `send_command`
/// fails synchronously while the socket is closed instead of queueing.
#[derive(Debug, Clone)]
pub struct UpstreamHandle {
    commands: mpsc::Sender<String>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl UpstreamHandle {
    /// Build a handle from its shared parts.
    #[must_use]
    pub const fn new(
        commands: mpsc::Sender<String>,
        open: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            commands,
            open,
            cancel,
        }
    }

    /// Whether the upstream socket is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Forward a raw command frame (a bet) to the feed.
    ///
    /// Fails synchronously when the socket is closed or the command channel
    /// is full; unsent commands are never buffered for later.
    pub fn send_command(&self, payload: String) -> Result<(), CommandError> {
        if !self.is_open() {
            return Err(CommandError::NotConnected);
        }
        self.commands
            .try_send(payload)
            .map_err(|_| CommandError::Backlogged)
    }

    /// Shut the connection down: cancels the heartbeat and any pending
    /// reconnect, and closes the socket. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Factory for per-identity upstream feed connections.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Spawn a feed connection for `identity` using `token`.
    ///
    /// Connection lifecycle events and interpreted frames are delivered on
    /// `events`; the returned handle carries the command path and shutdown.
    async fn connect(
        &self,
        identity: &str,
        token: &SessionToken,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> Result<UpstreamHandle, UpstreamConnectError>;
}
