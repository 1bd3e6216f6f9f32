//! `ChatClient` reconnect and credential-invalidation policy.
//!
//! Each test drives the server end of every connection by hand through a
//! [`MemoryConnection`], with the Tokio clock paused so delays are exact.

use std::time::Duration;

use chatwire::prelude::*;
use chatwire_protocol::AuthorizationResult;
use chatwire_transport::{Connection, Connector, MemoryConnection, TransportError};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

// =========================================================================
// Helpers
// =========================================================================

/// Hands the accepting end of every new pair to the test. The number of
/// connect attempts is the number of ends the test has received.
struct PairConnector {
    peers: mpsc::UnboundedSender<MemoryConnection>,
}

impl Connector for PairConnector {
    type Connection = MemoryConnection;
    type Error = TransportError;

    async fn connect(&self, credential: &str) -> Result<MemoryConnection, TransportError> {
        let (client, server) = MemoryConnection::pair_with_credential(credential);
        self.peers.send(server).map_err(|_| TransportError::Shutdown)?;
        Ok(client)
    }
}

fn client(config: ClientConfig) -> (ChatClient, ClientEvents, mpsc::UnboundedReceiver<MemoryConnection>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (client, events) = ChatClient::new(PairConnector { peers: tx }, config);
    (client, events, rx)
}

async fn send(conn: &MemoryConnection, packet: Packet) {
    conn.send(&packet.encode().unwrap()).await.unwrap();
}

async fn accept(conn: &MemoryConnection) {
    send(conn, Packet::AuthorizationResult(AuthorizationResult::Accepted)).await;
}

fn message() -> MessageRecord {
    MessageRecord {
        id: "m1".into(),
        author: "u2".into(),
        channel: "c1".into(),
        server: "s1".into(),
        content: "hi".into(),
        created_at_millis: 1_700_000_000_000,
    }
}

// =========================================================================
// Reconnect
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_timeout_reconnects_exactly_once_after_delay() {
    let (client, mut events, mut peers) = client(ClientConfig::default());
    let start = Instant::now();
    client.connect("alice").unwrap();

    let first = peers.recv().await.unwrap();
    assert_eq!(first.credential(), Some("alice"));
    accept(&first).await;

    assert_eq!(events.recv().await, Some(ClientEvent::Connected));
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Disconnected(CloseReason::HeartbeatTimeout))
    );
    let closed_at = start.elapsed();
    assert!(closed_at > Duration::from_secs(10) && closed_at <= Duration::from_secs(11));
    assert!(client.status().await.unwrap().reconnect_scheduled);

    let second = peers.recv().await.unwrap();
    assert_eq!(start.elapsed(), closed_at + Duration::from_secs(2));
    assert_eq!(second.credential(), Some("alice"));
    assert_eq!(events.recv().await, Some(ClientEvent::Connected));

    // Well before the second session could time out: no further attempts.
    time::sleep(Duration::from_secs(5)).await;
    assert!(peers.try_recv().is_err());
    assert_eq!(client.status().await.unwrap().connect_attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_reconnects_with_accepted_credential() {
    let (client, mut events, mut peers) = client(ClientConfig::default());
    client.connect("alice").unwrap();

    let first = peers.recv().await.unwrap();
    accept(&first).await;
    assert_eq!(events.recv().await, Some(ClientEvent::Connected));
    first.close().await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Disconnected(CloseReason::PeerClosed))
    );

    // An explicit connect replaces the pending reconnect.
    client.connect("bob").unwrap();
    let second = peers.recv().await.unwrap();
    assert_eq!(second.credential(), Some("bob"));
    assert!(!client.status().await.unwrap().reconnect_scheduled);

    // "bob" is never accepted, so the reconnect falls back to "alice".
    assert_eq!(events.recv().await, Some(ClientEvent::Connected));
    second.close().await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Disconnected(CloseReason::PeerClosed))
    );

    let third = peers.recv().await.unwrap();
    assert_eq!(third.credential(), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn test_manual_disconnect_does_not_reconnect() {
    let (client, mut events, mut peers) = client(ClientConfig::default());
    client.connect("alice").unwrap();
    let peer = peers.recv().await.unwrap();
    accept(&peer).await;
    assert_eq!(events.recv().await, Some(ClientEvent::Connected));

    client.disconnect().unwrap();
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Disconnected(CloseReason::Explicit))
    );

    time::sleep(Duration::from_secs(10)).await;
    assert!(peers.try_recv().is_err());
    let status = client.status().await.unwrap();
    assert_eq!(status.session, None);
    assert!(!status.reconnect_scheduled);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_disabled_when_delay_is_none() {
    let config = ClientConfig {
        reconnect_delay: None,
        ..ClientConfig::default()
    };
    let (client, mut events, mut peers) = client(config);
    client.connect("alice").unwrap();
    let peer = peers.recv().await.unwrap();
    peer.close().await.unwrap();

    assert_eq!(events.recv().await, Some(ClientEvent::Connected));
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Disconnected(CloseReason::PeerClosed))
    );
    time::sleep(Duration::from_secs(10)).await;
    assert!(peers.try_recv().is_err());
}

// =========================================================================
// Credential invalidation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_rejected_credential_is_not_retried_but_a_new_one_is() {
    let (client, mut events, mut peers) = client(ClientConfig::default());
    client.connect("stale").unwrap();

    let first = peers.recv().await.unwrap();
    send(
        &first,
        Packet::AuthorizationResult(AuthorizationResult::rejected("Forbidden")),
    )
    .await;

    assert_eq!(events.recv().await, Some(ClientEvent::Connected));
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::AuthInvalid {
            reason: "Forbidden".into()
        })
    );

    // No automatic reconnect after a rejection.
    time::sleep(Duration::from_secs(10)).await;
    assert!(peers.try_recv().is_err());

    // Same credential: no attempt.
    client.connect("stale").unwrap();
    let status = client.status().await.unwrap();
    assert_eq!(status.connect_attempts, 1);
    assert!(!status.auth_valid);
    assert_eq!(status.session, None);
    assert!(peers.try_recv().is_err());

    // Different credential: auth flag reset and one attempt.
    client.connect("fresh").unwrap();
    let second = peers.recv().await.unwrap();
    assert_eq!(second.credential(), Some("fresh"));
    let status = client.status().await.unwrap();
    assert_eq!(status.connect_attempts, 2);
    assert!(status.auth_valid);
}

#[tokio::test(start_paused = true)]
async fn test_new_credential_right_after_rejection_connects() {
    let (client, mut events, mut peers) = client(ClientConfig::default());
    client.connect("stale").unwrap();

    let first = peers.recv().await.unwrap();
    send(
        &first,
        Packet::AuthorizationResult(AuthorizationResult::rejected("Forbidden")),
    )
    .await;
    assert_eq!(events.recv().await, Some(ClientEvent::Connected));
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::AuthInvalid {
            reason: "Forbidden".into()
        })
    );

    // Before the rejected session has finished closing.
    client.connect("fresh").unwrap();
    let second = peers.recv().await.unwrap();
    assert_eq!(second.credential(), Some("fresh"));
    accept(&second).await;
    assert_eq!(events.recv().await, Some(ClientEvent::Connected));

    let status = client.status().await.unwrap();
    assert!(status.auth_valid);
    assert_eq!(status.session, Some(SessionState::Open));
    assert_eq!(status.connect_attempts, 2);

    // The first session's close is not reported a second time.
    time::sleep(Duration::from_secs(1)).await;
    assert!(events.try_recv().is_err());
}

// =========================================================================
// Events and sending
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_while_connected_is_a_no_op() {
    let (client, _events, mut peers) = client(ClientConfig::default());
    client.connect("alice").unwrap();
    client.connect("alice").unwrap();
    client.connect("bob").unwrap();

    let _peer = peers.recv().await.unwrap();
    assert_eq!(client.status().await.unwrap().connect_attempts, 1);
    assert!(peers.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_chat_packets_become_client_events() {
    let (client, mut events, mut peers) = client(ClientConfig::default());
    client.connect("alice").unwrap();
    let peer = peers.recv().await.unwrap();

    accept(&peer).await;
    send(&peer, Packet::NewMessage(message())).await;
    send(
        &peer,
        Packet::UserStatusChanged {
            user: "u2".into(),
            online: true,
        },
    )
    .await;

    assert_eq!(events.recv().await, Some(ClientEvent::Connected));
    assert_eq!(events.recv().await, Some(ClientEvent::Message(message())));
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::UserStatusChanged {
            user: "u2".into(),
            online: true
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_a_session() {
    let (client, _events, mut peers) = client(ClientConfig::default());
    assert!(matches!(
        client.send(Packet::Ping).await,
        Err(ChatwireError::Session(SessionError::Closed))
    ));

    client.connect("alice").unwrap();
    let peer = peers.recv().await.unwrap();
    client
        .send(Packet::Authorization {
            token: "alice".into(),
        })
        .await
        .unwrap();

    let frame = peer.recv().await.unwrap().unwrap();
    assert_eq!(
        Packet::decode(&frame).unwrap(),
        Packet::Authorization {
            token: "alice".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_closes_its_session() {
    let (client, _events, mut peers) = client(ClientConfig::default());
    client.connect("alice").unwrap();
    let peer = peers.recv().await.unwrap();

    drop(client);

    // Drain whatever was sent before the close.
    while peer.recv().await.unwrap().is_some() {}
    assert!(peers.recv().await.is_none());
}
