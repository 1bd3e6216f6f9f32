//! Error types for the session layer.

use std::time::Duration;

use chatwire_protocol::ProtocolError;

/// Errors that end (or prevent) a session.
///
/// Unlike [`ProtocolError`], which only ever costs one frame, every variant
/// here is fatal to the session it came from.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The accepting peer refused the credential.
    #[error("authorization rejected: {0}")]
    AuthorizationRejected(String),

    /// No heartbeat arrived within the timeout window.
    #[error("no heartbeat from peer within {0:?}")]
    HeartbeatTimeout(Duration),

    /// The session is already closed; nothing more can be sent on it.
    #[error("session closed")]
    Closed,

    /// The peer never presented a credential during the grace period.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The underlying connection failed.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A packet could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    pub(crate) fn transport(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(e))
    }
}
