//! Upstream Feed Adapters
//!
//! Everything that talks to the game provider: the WebSocket feed client
//! with heartbeat and reconnection, the frame interpreter, and the HTTP
//! collaborators for token minting and statistic history.

pub mod heartbeat;
pub mod interpreter;
pub mod reconnect;

mod auth;
mod history;

pub use auth::HttpTokenProvider;
pub use history::HttpHistoryFetcher;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    SessionToken, UpstreamConnectError, UpstreamConnector, UpstreamEvent, UpstreamHandle,
};
use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use interpreter::interpret;
use reconnect::{ReconnectConfig, ReconnectPolicy};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection closed by the provider or heartbeat timeout.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Feed Client Configuration
// =============================================================================

/// Configuration for one feed connection.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Base WebSocket URL of the live feed.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Capacity of the upstream command channel.
    pub command_capacity: usize,
}

impl FeedClientConfig {
    /// Create a new configuration with default tuning.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            command_capacity: 32,
        }
    }

    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub fn from_settings(settings: &crate::FeedSettings, command_capacity: usize) -> Self {
        Self {
            url: settings.url.clone(),
            reconnect: ReconnectConfig::from_feed_settings(settings),
            heartbeat: HeartbeatConfig::from_feed_settings(settings),
            command_capacity,
        }
    }
}

/// The feed URL carrying the session token as a connection parameter.
fn session_url(base: &str, token: &SessionToken) -> String {
    format!("{base}?JSESSIONID={}", token.as_str())
}

// =============================================================================
// Feed Client
// =============================================================================

/// WebSocket client for one identity's live feed connection.
///
/// Manages the connection lifecycle: application-level heartbeat, automatic
/// reconnection with exponential backoff and an attempt budget, frame
/// interpretation, and the bet-forwarding command path.
pub struct FeedClient {
    config: FeedClientConfig,
    identity: String,
    token: SessionToken,
    event_tx: mpsc::Sender<UpstreamEvent>,
    command_rx: mpsc::Receiver<String>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub const fn new(
        config: FeedClientConfig,
        identity: String,
        token: SessionToken,
        event_tx: mpsc::Sender<UpstreamEvent>,
        command_rx: mpsc::Receiver<String>,
        open: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            identity,
            token,
            event_tx,
            command_rx,
            open,
            cancel,
        }
    }

    /// Run the connection loop until cancelled or the retry budget is spent.
    pub async fn run(mut self) -> Result<(), FeedClientError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(identity = %self.identity, "feed client cancelled");
                return Ok(());
            }

            match self.connect_and_stream(&mut reconnect_policy).await {
                Ok(()) => {
                    tracing::info!(identity = %self.identity, "feed connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(identity = %self.identity, error = %e, "feed connection error");
                    let _ = self.event_tx.send(UpstreamEvent::Disconnected).await;

                    if let Some(delay) = reconnect_policy.next_delay() {
                        let attempt = reconnect_policy.attempt_count();
                        tracing::info!(
                            identity = %self.identity,
                            attempt,
                            delay_ms = delay.as_millis(),
                            "reconnecting to feed"
                        );
                        let _ = self
                            .event_tx
                            .send(UpstreamEvent::Reconnecting { attempt })
                            .await;

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!(identity = %self.identity, "cancelled during reconnect delay");
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        let _ = self
                            .event_tx
                            .send(UpstreamEvent::Error(
                                "upstream retry budget exhausted".to_string(),
                            ))
                            .await;
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded);
                    }
                }
            }
        }
    }

    /// Connect and stream until an error, close, or cancellation.
    async fn connect_and_stream(
        &mut self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedClientError> {
        let url = session_url(&self.config.url, &self.token);
        tracing::info!(identity = %self.identity, "connecting to feed");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Connected: the command path opens and the retry budget resets.
        self.open.store(true, Ordering::SeqCst);
        reconnect_policy.reset();
        let _ = self.event_tx.send(UpstreamEvent::Connected).await;

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = CancellationToken::new();
        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat.clone(),
                heartbeat_state.clone(),
                heartbeat_tx,
                heartbeat_cancel.clone(),
            )
            .run(),
        );

        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break Ok(());
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendPing) => {
                            heartbeat_state.mark_ping_sent();
                            if let Err(e) = write
                                .send(Message::Text(heartbeat::keepalive_frame().into()))
                                .await
                            {
                                break Err(e.into());
                            }
                        }
                        Some(HeartbeatEvent::Timeout) => {
                            tracing::warn!(identity = %self.identity, "heartbeat timeout");
                            break Err(FeedClientError::ConnectionClosed);
                        }
                        None => {
                            tracing::debug!("heartbeat channel closed");
                        }
                    }
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(payload) => {
                            if let Err(e) = write.send(Message::Text(payload.into())).await {
                                break Err(e.into());
                            }
                        }
                        // All command senders dropped: the owning session is gone.
                        None => break Ok(()),
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if heartbeat::is_pong(&text) {
                                heartbeat_state.record_pong();
                            } else {
                                let event = interpret(&text);
                                let _ = self.event_tx.send(UpstreamEvent::Event(event)).await;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_pong();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!(identity = %self.identity, "feed sent close frame");
                            break Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Err(e.into()),
                        None => {
                            tracing::info!(identity = %self.identity, "feed stream ended");
                            break Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        };

        // No timer outlives its socket, and the command path closes with it.
        heartbeat_cancel.cancel();
        self.open.store(false, Ordering::SeqCst);
        result
    }
}

// =============================================================================
// Connector
// =============================================================================

/// [`UpstreamConnector`] spawning one [`FeedClient`] task per identity.
pub struct FeedConnector {
    config: FeedClientConfig,
}

impl FeedConnector {
    /// Create a connector with the given per-connection configuration.
    #[must_use]
    pub const fn new(config: FeedClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl UpstreamConnector for FeedConnector {
    async fn connect(
        &self,
        identity: &str,
        token: &SessionToken,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> Result<UpstreamHandle, UpstreamConnectError> {
        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let open = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let client = FeedClient::new(
            self.config.clone(),
            identity.to_string(),
            token.clone(),
            events,
            command_rx,
            open.clone(),
            cancel.clone(),
        );

        let identity = identity.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.run().await {
                tracing::warn!(identity = %identity, error = %e, "feed client terminated");
            }
        });

        Ok(UpstreamHandle::new(command_tx, open, cancel))
    }
}
