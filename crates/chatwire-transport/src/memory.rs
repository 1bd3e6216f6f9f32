//! In-process connection pair backed by Tokio channels.
//!
//! Each side owns the sending half of one unbounded channel and the
//! receiving half of the other. Frames are delivered whole and in order,
//! which is exactly the guarantee the session layer asks of a transport.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{next_connection_id, Connection, ConnectionId, TransportError};

/// One end of an in-memory duplex connection.
///
/// Closing either end makes the other end's [`recv`](Connection::recv)
/// return `Ok(None)` once buffered frames are drained, and makes its
/// [`send`](Connection::send) fail.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    credential: Option<String>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryConnection {
    /// Creates two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx, None), Self::new(b_tx, a_rx, None))
    }

    /// Creates two connected ends where the second (accepting) end reports
    /// `credential` from [`Connection::credential`], as if the first end had
    /// supplied it while connecting.
    pub fn pair_with_credential(credential: impl Into<String>) -> (Self, Self) {
        let (initiator, mut acceptor) = Self::pair();
        acceptor.credential = Some(credential.into());
        (initiator, acceptor)
    }

    fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
        credential: Option<String>,
    ) -> Self {
        Self {
            id: next_connection_id(),
            credential,
            outbound: Mutex::new(Some(outbound)),
            inbound: tokio::sync::Mutex::new(inbound),
        }
    }

    /// Returns `true` once this end has been closed locally.
    pub fn is_closed(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return Err(TransportError::ConnectionClosed("closed locally".into()));
        };
        tx.send(frame.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer closed".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let closed = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // A concurrent recv holds the lock; the peer still observes the
        // close through our dropped sender.
        if let Ok(mut inbound) = self.inbound.try_lock() {
            inbound.close();
        }
        if closed.is_some() {
            tracing::debug!(id = %self.id, "memory connection closed");
        }
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}
