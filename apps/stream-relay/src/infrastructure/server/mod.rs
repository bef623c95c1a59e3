//! Downstream HTTP/WebSocket Server
//!
//! The axum surface downstream clients talk to. One WebSocket endpoint hands
//! each accepted socket to the multiplexer, plus a liveness probe and a
//! session stats endpoint for operators.
//!
//! # Endpoints
//!
//! - `GET /ws?identity=...` - Downstream relay WebSocket
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /stats` - Live session stats as JSON

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::relay::Multiplexer;

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the relay server.
pub struct ServerState {
    multiplexer: Arc<Multiplexer>,
    outbound_capacity: usize,
}

impl ServerState {
    /// Create new server state.
    #[must_use]
    pub const fn new(multiplexer: Arc<Multiplexer>, outbound_capacity: usize) -> Self {
        Self {
            multiplexer,
            outbound_capacity,
        }
    }
}

// =============================================================================
// Relay Server
// =============================================================================

/// Downstream-facing HTTP server.
pub struct RelayServer {
    port: u16,
    state: Arc<ServerState>,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Create a new relay server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<ServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RelayServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), RelayServerError> {
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/healthz", get(liveness_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "relay server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| RelayServerError::ServerFailed(e.to_string()))?;

        tracing::info!("relay server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(default)]
    identity: String,
}

async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, query.identity, socket))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn stats_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.multiplexer.stats())
}

// =============================================================================
// Socket Task
// =============================================================================

/// Per-connection task owning the downstream socket.
async fn handle_socket(state: Arc<ServerState>, identity: String, mut socket: WebSocket) {
    if identity.is_empty() {
        // Policy violation, refused before any session exists.
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "identity required".into(),
            })))
            .await;
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.outbound_capacity);
    let cancel = match state.multiplexer.register(&identity, outbound_tx) {
        Ok(cancel) => cancel,
        Err(error) => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: error.to_string().into(),
                })))
                .await;
            return;
        }
    };

    // When the session is cancelled the teardown is already underway on the
    // cancelling side; removing here would race a replacement session.
    let mut cancelled = false;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                cancelled = true;
                break;
            }
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else { break };
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(identity, %error, "failed to encode outbound message");
                    }
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        state.multiplexer.handle_message(&identity, &text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(identity, "downstream socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::debug!(identity, %error, "downstream socket error");
                        break;
                    }
                }
            }
        }
    }

    if !cancelled {
        state.multiplexer.remove(&identity);
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
