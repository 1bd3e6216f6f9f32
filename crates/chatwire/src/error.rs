//! Unified error type for Chatwire.

use chatwire_protocol::ProtocolError;
use chatwire_session::SessionError;
use chatwire_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attributes let `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum ChatwireError {
    /// A transport-level error (bind, accept, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (authorization, handshake, closed).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The [`ChatClient`](crate::ChatClient) task has stopped.
    #[error("chat client stopped")]
    ClientStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let chatwire_err: ChatwireError = err.into();
        assert!(matches!(chatwire_err, ChatwireError::Transport(_)));
        assert!(chatwire_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownPacketType(99);
        let chatwire_err: ChatwireError = err.into();
        assert!(matches!(chatwire_err, ChatwireError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthorizationRejected("Forbidden".into());
        let chatwire_err: ChatwireError = err.into();
        assert!(matches!(chatwire_err, ChatwireError::Session(_)));
        assert!(chatwire_err.to_string().contains("Forbidden"));
    }
}
