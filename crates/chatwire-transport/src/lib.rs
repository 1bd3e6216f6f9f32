//! Transport abstraction layer for Chatwire.
//!
//! Provides the [`Transport`], [`Connector`] and [`Connection`] traits that
//! abstract over how whole frames move between two peers. The session layer
//! above never sees sockets, only frames.
//!
//! # Implementations
//!
//! - [`WebSocketTransport`] / [`WebSocketConnector`] — one binary WebSocket
//!   message per frame, via `tokio-tungstenite` (feature `websocket`)
//! - [`MemoryConnection`] — an in-process connection pair, used by tests and
//!   by embedders that run both peers in one process
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::MemoryConnection;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector, WebSocketTransport};

/// Process-wide connection number, used to correlate log lines.
///
/// Allocated by every transport from one counter, so a WebSocket connection
/// and an in-memory one never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> ConnectionId {
    ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Accepts new incoming connections (the server side).
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Establishes outbound connections (the client side).
///
/// The credential is forwarded to the accepting peer as a connection
/// parameter. The connector never inspects it.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;
    /// The error type for connect failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens a new connection carrying `credential`.
    fn connect(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// A single duplex connection that moves whole frames.
///
/// All methods take `&self`: sending and receiving may happen from the same
/// task concurrently (a `select!` loop polls `recv` while it sends).
/// Implementations must keep `recv` cancel-safe.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one frame to the remote peer.
    fn send(&self, frame: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The credential the remote peer supplied while establishing the
    /// connection, if the transport carries one.
    fn credential(&self) -> Option<&str> {
        None
    }
}
