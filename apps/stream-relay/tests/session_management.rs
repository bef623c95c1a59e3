//! Session lifecycle tests.
//!
//! Drives the multiplexer with fake upstream collaborators: a static token
//! provider, an empty history fetcher, and a connector that hands back
//! inspectable handles instead of opening real sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use stream_relay::application::ports::{
    HistoryError, HistoryFetcher, SessionToken, TokenError, TokenProvider, UpstreamConnectError,
    UpstreamConnector, UpstreamEvent, UpstreamHandle,
};
use stream_relay::{
    ArtifactTtls, HistoryEntry, InMemoryCacheStore, Multiplexer, ServerMessage, SharedArtifacts,
    SingleFlightConfig,
};

// =============================================================================
// Fakes
// =============================================================================

struct StaticToken;

#[async_trait]
impl TokenProvider for StaticToken {
    async fn fetch_token(&self) -> Result<SessionToken, TokenError> {
        Ok(SessionToken::new("sess-static"))
    }
}

struct FailingToken;

#[async_trait]
impl TokenProvider for FailingToken {
    async fn fetch_token(&self) -> Result<SessionToken, TokenError> {
        Err(TokenError::Rejected("credentials revoked".to_string()))
    }
}

struct EmptyHistory;

#[async_trait]
impl HistoryFetcher for EmptyHistory {
    async fn fetch_history(
        &self,
        _token: &SessionToken,
    ) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(Vec::new())
    }
}

/// Connector that records connects and exposes the command channel of the
/// most recent connection.
struct FakeConnector {
    connects: AtomicU32,
    open: bool,
    commands: Mutex<Option<mpsc::Receiver<String>>>,
}

impl FakeConnector {
    fn new(open: bool) -> Self {
        Self {
            connects: AtomicU32::new(0),
            open,
            commands: Mutex::new(None),
        }
    }

    fn take_commands(&self) -> Option<mpsc::Receiver<String>> {
        self.commands.lock().take()
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(
        &self,
        _identity: &str,
        _token: &SessionToken,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> Result<UpstreamHandle, UpstreamConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.open {
            let _ = events.send(UpstreamEvent::Connected).await;
        }
        let (tx, rx) = mpsc::channel(8);
        *self.commands.lock() = Some(rx);
        Ok(UpstreamHandle::new(
            tx,
            Arc::new(AtomicBool::new(self.open)),
            CancellationToken::new(),
        ))
    }
}

fn artifacts_with(provider: Arc<dyn TokenProvider>) -> Arc<SharedArtifacts> {
    Arc::new(SharedArtifacts::new(
        Arc::new(InMemoryCacheStore::new()),
        provider,
        Arc::new(EmptyHistory),
        SingleFlightConfig {
            lock_lease: Duration::from_secs(30),
            retry_wait: Duration::from_millis(10),
        },
        ArtifactTtls::default(),
    ))
}

fn multiplexer(connector: Arc<dyn UpstreamConnector>, idle_timeout: Duration) -> Arc<Multiplexer> {
    Arc::new(Multiplexer::new(
        artifacts_with(Arc::new(StaticToken)),
        connector,
        idle_timeout,
    ))
}

/// Give spawned attach tasks time to run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn reconnect_replaces_previous_session() {
    let connector = Arc::new(FakeConnector::new(true));
    let mux = multiplexer(connector.clone(), Duration::from_secs(600));

    let (tx1, mut rx1) = mpsc::channel(16);
    let cancel1 = mux.register("alice", tx1).unwrap();
    settle().await;

    let (tx2, _rx2) = mpsc::channel(16);
    let cancel2 = mux.register("alice", tx2).unwrap();
    settle().await;

    assert!(cancel1.is_cancelled());
    assert!(!cancel2.is_cancelled());
    assert_eq!(mux.stats().total_connections, 1);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

    // The first socket saw its upstream come up before being replaced.
    assert!(matches!(rx1.try_recv(), Ok(ServerMessage::Connected)));
}

#[tokio::test]
async fn empty_identity_is_rejected() {
    let mux = multiplexer(
        Arc::new(FakeConnector::new(false)),
        Duration::from_secs(600),
    );
    let (tx, _rx) = mpsc::channel(16);
    assert!(mux.register("", tx).is_err());
    assert_eq!(mux.stats().total_connections, 0);
}

#[tokio::test]
async fn ping_is_answered_without_upstream() {
    let mux = multiplexer(
        Arc::new(FakeConnector::new(false)),
        Duration::from_secs(600),
    );

    let (tx, mut rx) = mpsc::channel(16);
    mux.register("bob", tx).unwrap();
    settle().await;

    mux.handle_message("bob", r#"{"type":"ping"}"#);
    match rx.recv().await {
        Some(ServerMessage::Pong { timestamp }) => assert!(timestamp > 0),
        other => panic!("expected pong, got {other:?}"),
    }
}

#[tokio::test]
async fn bet_rejected_while_upstream_closed() {
    let mux = multiplexer(
        Arc::new(FakeConnector::new(false)),
        Duration::from_secs(600),
    );

    let (tx, mut rx) = mpsc::channel(16);
    mux.register("carol", tx).unwrap();
    settle().await;

    mux.handle_message("carol", r#"{"type":"bet","payload":{"amount":1}}"#);
    match rx.recv().await {
        Some(ServerMessage::Error { message }) => {
            assert!(message.contains("not connected"), "got: {message}");
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn bet_forwarded_when_upstream_open() {
    let connector = Arc::new(FakeConnector::new(true));
    let mux = multiplexer(connector.clone(), Duration::from_secs(600));

    let (tx, _rx) = mpsc::channel(16);
    mux.register("dave", tx).unwrap();
    settle().await;

    let mut commands = connector.take_commands().expect("upstream attached");
    mux.handle_message(
        "dave",
        r#"{"type":"bet","payload":{"amount":5,"target":"red"}}"#,
    );

    let forwarded = commands.recv().await.expect("bet forwarded");
    let value: serde_json::Value = serde_json::from_str(&forwarded).unwrap();
    assert_eq!(value["amount"], 5);
    assert_eq!(value["target"], "red");
}

#[tokio::test]
async fn malformed_message_gets_error_reply() {
    let mux = multiplexer(
        Arc::new(FakeConnector::new(false)),
        Duration::from_secs(600),
    );

    let (tx, mut rx) = mpsc::channel(16);
    mux.register("erin", tx).unwrap();
    settle().await;

    mux.handle_message("erin", "not json at all");
    match rx.recv().await {
        Some(ServerMessage::Error { message }) => assert!(message.contains("malformed")),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn auth_failure_is_reported_downstream() {
    let mux = Arc::new(Multiplexer::new(
        artifacts_with(Arc::new(FailingToken)),
        Arc::new(FakeConnector::new(true)),
        Duration::from_secs(600),
    ));

    let (tx, mut rx) = mpsc::channel(16);
    mux.register("frank", tx).unwrap();

    match rx.recv().await {
        Some(ServerMessage::Error { message }) => {
            assert!(message.contains("authentication"), "got: {message}");
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn idle_sweep_removes_only_stale_sessions() {
    let mux = multiplexer(
        Arc::new(FakeConnector::new(false)),
        Duration::from_millis(50),
    );

    let (tx1, _rx1) = mpsc::channel(16);
    let (tx2, _rx2) = mpsc::channel(16);
    mux.register("stale", tx1).unwrap();
    mux.register("active", tx2).unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    mux.handle_message("active", r#"{"type":"ping"}"#);

    let swept = mux.sweep_idle();
    assert_eq!(swept, 1);

    let stats = mux.stats();
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.connections[0].identity, "active");
}

#[tokio::test]
async fn remove_tears_the_session_down() {
    let mux = multiplexer(
        Arc::new(FakeConnector::new(false)),
        Duration::from_secs(600),
    );

    let (tx, _rx) = mpsc::channel(16);
    let cancel = mux.register("grace", tx).unwrap();
    settle().await;

    mux.remove("grace");
    assert!(cancel.is_cancelled());
    assert_eq!(mux.stats().total_connections, 0);
}

#[tokio::test]
async fn shutdown_drains_every_session() {
    let mux = multiplexer(
        Arc::new(FakeConnector::new(false)),
        Duration::from_secs(600),
    );

    let (tx1, _rx1) = mpsc::channel(16);
    let (tx2, _rx2) = mpsc::channel(16);
    let cancel1 = mux.register("henry", tx1).unwrap();
    let cancel2 = mux.register("iris", tx2).unwrap();

    mux.shutdown();
    assert!(cancel1.is_cancelled());
    assert!(cancel2.is_cancelled());
    assert_eq!(mux.stats().total_connections, 0);
}
