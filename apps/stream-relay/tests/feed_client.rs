//! Feed client lifecycle against an in-process WebSocket feed.
//!
//! A local tokio-tungstenite server stands in for the provider so the
//! close/reconnect path runs over a real socket: connect, heartbeat,
//! server-initiated close, backoff, and the fresh connection afterwards.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use stream_relay::infrastructure::upstream::heartbeat::HeartbeatConfig;
use stream_relay::infrastructure::upstream::reconnect::ReconnectConfig;
use stream_relay::{FeedClientConfig, FeedConnector, SessionToken, UpstreamConnector, UpstreamEvent};

fn fast_config(url: String) -> FeedClientConfig {
    FeedClientConfig {
        url,
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        },
        heartbeat: HeartbeatConfig::new(Duration::from_millis(200), Duration::from_secs(5)),
        command_capacity: 8,
    }
}

async fn next_event(events: &mut mpsc::Receiver<UpstreamEvent>) -> UpstreamEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an upstream event")
        .expect("event channel closed")
}

#[tokio::test]
async fn socket_close_cancels_heartbeat_and_schedules_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Mock feed: accept, take the opening keepalive, close the socket, then
    // accept the reconnect and capture its first keepalive.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let first_keepalive = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text.to_string(),
                Some(Ok(_)) => {}
                other => panic!("expected a keepalive frame, got {other:?}"),
            }
        };
        ws.close(None).await.unwrap();

        // The closed connection must carry nothing but the close reply.
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => {}
                Ok(other) => panic!("frame after close: {other:?}"),
            }
        }

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let second_keepalive = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text.to_string(),
                Some(Ok(_)) => {}
                other => panic!("expected a keepalive frame, got {other:?}"),
            }
        };
        (first_keepalive, second_keepalive)
    });

    let connector = FeedConnector::new(fast_config(format!("ws://{addr}/feed")));
    let (event_tx, mut events) = mpsc::channel(16);
    let handle = connector
        .connect("user-1", &SessionToken::new("sess-1"), event_tx)
        .await
        .unwrap();

    assert!(matches!(next_event(&mut events).await, UpstreamEvent::Connected));
    assert!(handle.is_open());

    // Server-initiated close: the command path shuts synchronously and the
    // retry is announced before any backoff sleep.
    assert!(matches!(
        next_event(&mut events).await,
        UpstreamEvent::Disconnected
    ));
    assert!(!handle.is_open());

    let announced = Instant::now();
    match next_event(&mut events).await {
        UpstreamEvent::Reconnecting { attempt } => assert_eq!(attempt, 1),
        other => panic!("expected a reconnect announcement, got {other:?}"),
    }
    assert!(!handle.is_open());

    assert!(matches!(next_event(&mut events).await, UpstreamEvent::Connected));
    assert!(handle.is_open());

    // First retry waits one multiplier step past the base and stays under
    // the configured cap.
    let waited = announced.elapsed();
    assert!(waited >= Duration::from_millis(150), "reconnected after {waited:?}");
    assert!(waited <= Duration::from_millis(1500), "reconnected after {waited:?}");

    let (first_keepalive, second_keepalive) = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("mock feed timed out")
        .unwrap();
    assert!(first_keepalive.contains("protocol/v1/ping"));
    // A fresh heartbeat starts with the replacement socket.
    assert!(second_keepalive.contains("protocol/v1/ping"));

    handle.shutdown();
}

#[tokio::test]
async fn connect_failures_exhaust_the_retry_budget() {
    // Bind then drop, so the port actively refuses connections.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = fast_config(format!("ws://{addr}/feed"));
    config.reconnect.initial_delay = Duration::from_millis(10);
    config.reconnect.max_attempts = 2;

    let connector = FeedConnector::new(config);
    let (event_tx, mut events) = mpsc::channel(16);
    let handle = connector
        .connect("user-2", &SessionToken::new("sess-2"), event_tx)
        .await
        .unwrap();

    for expected_attempt in 1..=2 {
        assert!(matches!(
            next_event(&mut events).await,
            UpstreamEvent::Disconnected
        ));
        match next_event(&mut events).await {
            UpstreamEvent::Reconnecting { attempt } => assert_eq!(attempt, expected_attempt),
            other => panic!("expected a reconnect announcement, got {other:?}"),
        }
    }

    assert!(matches!(
        next_event(&mut events).await,
        UpstreamEvent::Disconnected
    ));
    match next_event(&mut events).await {
        UpstreamEvent::Error(message) => assert!(message.contains("retry budget")),
        other => panic!("expected a terminal error, got {other:?}"),
    }
    assert!(!handle.is_open());
}
