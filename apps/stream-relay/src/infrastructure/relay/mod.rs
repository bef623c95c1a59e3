//! Connection Multiplexer
//!
//! Owns the identity → session map and every mutation of it. Each downstream
//! client gets exactly one live session; a reconnect for the same identity
//! tears the previous session down completely (upstream shut down, downstream
//! cancelled, timers cleared) before the replacement is inserted, so the
//! single-session invariant holds without a visible race window.
//!
//! Sessions attach to the upstream feed asynchronously: registration returns
//! as soon as the session is inserted, and a spawned task acquires a session
//! token through the shared cache, connects the feed client, and pumps its
//! events into the session's outbound channel. A registration epoch guards
//! against a stale attach task racing a newer session for the same identity.

pub mod protocol;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{CommandError, UpstreamConnector, UpstreamEvent, UpstreamHandle};
use crate::application::services::SharedArtifacts;
use protocol::{ClientMessage, ServerMessage};

// =============================================================================
// Errors and Stats
// =============================================================================

/// Errors from session registration.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    /// The identity was missing or empty.
    #[error("identity must not be empty")]
    EmptyIdentity,
}

/// Per-session view served by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// The session's identity.
    pub identity: String,
    /// When the session registered.
    pub connected_at: DateTime<Utc>,
    /// Last downstream or feed activity.
    pub last_activity: DateTime<Utc>,
    /// Whether the upstream feed socket is currently open.
    pub upstream_connected: bool,
}

/// Multiplexer-wide stats.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    /// Number of live sessions.
    pub total_connections: usize,
    /// Per-session detail.
    pub connections: Vec<SessionStats>,
}

// =============================================================================
// Session
// =============================================================================

struct Session {
    epoch: u64,
    connected_at: DateTime<Utc>,
    last_activity: Arc<RwLock<DateTime<Utc>>>,
    outbound: mpsc::Sender<ServerMessage>,
    upstream: Arc<RwLock<Option<UpstreamHandle>>>,
    cancel: CancellationToken,
}

impl Session {
    fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }

    /// Cancel everything the session owns. Idempotent.
    fn teardown(&self) {
        if let Some(handle) = self.upstream.read().as_ref() {
            handle.shutdown();
        }
        self.cancel.cancel();
    }
}

// =============================================================================
// Multiplexer
// =============================================================================

type SessionMap = Arc<RwLock<HashMap<String, Session>>>;

/// Identity-keyed session registry and event router.
pub struct Multiplexer {
    sessions: SessionMap,
    epoch: AtomicU64,
    artifacts: Arc<SharedArtifacts>,
    connector: Arc<dyn UpstreamConnector>,
    idle_timeout: Duration,
}

impl Multiplexer {
    /// Create a multiplexer over its upstream collaborators.
    #[must_use]
    pub fn new(
        artifacts: Arc<SharedArtifacts>,
        connector: Arc<dyn UpstreamConnector>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            epoch: AtomicU64::new(0),
            artifacts,
            connector,
            idle_timeout,
        }
    }

    /// Register a session for `identity`, replacing any existing one.
    ///
    /// The previous session (if any) is fully torn down before the new one
    /// becomes visible. Returns the session's cancellation token; the
    /// downstream socket task exits when it fires.
    pub fn register(
        &self,
        identity: &str,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<CancellationToken, RegisterError> {
        if identity.is_empty() {
            return Err(RegisterError::EmptyIdentity);
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let session = Session {
            epoch,
            connected_at: Utc::now(),
            last_activity: Arc::new(RwLock::new(Utc::now())),
            outbound: outbound.clone(),
            upstream: Arc::new(RwLock::new(None)),
            cancel: cancel.clone(),
        };

        let previous = {
            let mut sessions = self.sessions.write();
            let previous = sessions.remove(identity);
            if let Some(ref prev) = previous {
                // Teardown happens before the replacement is inserted.
                prev.teardown();
            }
            sessions.insert(identity.to_string(), session);
            previous
        };
        if previous.is_some() {
            tracing::info!(identity, "replaced existing session");
        } else {
            tracing::info!(identity, "session registered");
        }

        let sessions = Arc::clone(&self.sessions);
        let artifacts = Arc::clone(&self.artifacts);
        let connector = Arc::clone(&self.connector);
        let identity = identity.to_string();
        let attach_cancel = cancel.clone();
        tokio::spawn(attach_upstream(
            sessions,
            artifacts,
            connector,
            identity,
            epoch,
            outbound,
            attach_cancel,
        ));

        Ok(cancel)
    }

    /// Handle one inbound frame from `identity`'s downstream socket.
    pub fn handle_message(&self, identity: &str, raw: &str) {
        let (outbound, upstream) = {
            let sessions = self.sessions.read();
            let Some(session) = sessions.get(identity) else {
                tracing::debug!(identity, "message for unknown session");
                return;
            };
            session.touch();
            (session.outbound.clone(), session.upstream.clone())
        };

        let reply = match serde_json::from_str::<ClientMessage>(raw) {
            Ok(ClientMessage::Ping) => ServerMessage::Pong {
                timestamp: Utc::now().timestamp_millis(),
            },
            Ok(ClientMessage::Bet { payload } | ClientMessage::Command { payload }) => {
                let result = upstream
                    .read()
                    .as_ref()
                    .map_or(Err(CommandError::NotConnected), |handle| {
                        handle.send_command(payload.to_string())
                    });
                match result {
                    Ok(()) => return,
                    Err(error) => ServerMessage::Error {
                        message: error.to_string(),
                    },
                }
            }
            Err(_) => ServerMessage::Error {
                message: "malformed message".to_string(),
            },
        };

        if outbound.try_send(reply).is_err() {
            tracing::debug!(identity, "downstream buffer full, reply dropped");
        }
    }

    /// Tear down and remove `identity`'s session.
    pub fn remove(&self, identity: &str) {
        if let Some(session) = self.sessions.write().remove(identity) {
            session.teardown();
            tracing::info!(identity, "session removed");
        }
    }

    /// Tear down sessions idle longer than the threshold.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep_idle(&self) -> usize {
        let now = Utc::now();
        let threshold = chrono::Duration::from_std(self.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));

        let mut sessions = self.sessions.write();
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| now - *s.last_activity.read() > threshold)
            .map(|(identity, _)| identity.clone())
            .collect();

        for identity in &stale {
            if let Some(session) = sessions.remove(identity) {
                session.teardown();
                tracing::info!(identity, "idle session swept");
            }
        }
        stale.len()
    }

    /// Snapshot of the live sessions.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        let sessions = self.sessions.read();
        let connections: Vec<SessionStats> = sessions
            .iter()
            .map(|(identity, session)| SessionStats {
                identity: identity.clone(),
                connected_at: session.connected_at,
                last_activity: *session.last_activity.read(),
                upstream_connected: session
                    .upstream
                    .read()
                    .as_ref()
                    .is_some_and(UpstreamHandle::is_open),
            })
            .collect();
        RelayStats {
            total_connections: connections.len(),
            connections,
        }
    }

    /// Tear down every session.
    pub fn shutdown(&self) {
        let mut sessions = self.sessions.write();
        let count = sessions.len();
        for (_, session) in sessions.drain() {
            session.teardown();
        }
        if count > 0 {
            tracing::info!(count, "all sessions torn down");
        }
    }
}

/// Acquire a token, connect the feed, and pump its events downstream.
///
/// Runs detached from registration so a slow token fetch never blocks the
/// WebSocket handshake.
async fn attach_upstream(
    sessions: SessionMap,
    artifacts: Arc<SharedArtifacts>,
    connector: Arc<dyn UpstreamConnector>,
    identity: String,
    epoch: u64,
    outbound: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
) {
    let token = match artifacts.session_token().await {
        Ok(token) => token,
        Err(error) => {
            tracing::warn!(identity, %error, "session token unavailable");
            let _ = outbound.try_send(ServerMessage::Error {
                message: format!("upstream authentication failed: {error}"),
            });
            return;
        }
    };

    let (event_tx, mut event_rx) = mpsc::channel::<UpstreamEvent>(64);
    let handle = match connector.connect(&identity, &token, event_tx).await {
        Ok(handle) => handle,
        Err(error) => {
            tracing::warn!(identity, %error, "upstream connect failed");
            let _ = outbound.try_send(ServerMessage::Error {
                message: format!("upstream connect failed: {error}"),
            });
            return;
        }
    };

    // Epoch guard: a newer session for this identity may have replaced
    // ours while the token fetch was in flight.
    let last_activity = {
        let sessions = sessions.read();
        match sessions.get(&identity) {
            Some(session) if session.epoch == epoch => {
                *session.upstream.write() = Some(handle.clone());
                session.last_activity.clone()
            }
            _ => {
                tracing::debug!(identity, "stale attach discarded");
                handle.shutdown();
                return;
            }
        }
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let message = match event {
                    UpstreamEvent::Connected => ServerMessage::Connected,
                    UpstreamEvent::Disconnected => ServerMessage::Disconnected,
                    UpstreamEvent::Reconnecting { attempt } => {
                        ServerMessage::Reconnecting { attempt }
                    }
                    UpstreamEvent::Event(event) => {
                        *last_activity.write() = Utc::now();
                        ServerMessage::Event { event }
                    }
                    UpstreamEvent::Error(message) => ServerMessage::Error { message },
                };
                // Drop rather than block when the downstream buffer is full.
                if outbound.try_send(message).is_err() {
                    tracing::debug!(identity, "downstream buffer full, message dropped");
                }
            }
        }
    }
    handle.shutdown();
}
