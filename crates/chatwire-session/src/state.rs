//! Session lifecycle: which side we are, where we are, and why we stopped.

use std::fmt;

/// Which end of the connection a session represents.
///
/// The initiator drives the heartbeat; the responder echoes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The connecting side (a client).
    Initiator,
    /// The accepting side (a server).
    Responder,
}

/// The current state of a session.
///
/// ```text
///   Connecting ──(transport up)──→ Open ──(any close)──→ Closed
///        └────────(connect failed)───────────────────────↗
/// ```
///
/// `Closed` is terminal. A new session is needed to talk to the peer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The transport is being established.
    Connecting,
    /// Frames can flow in both directions.
    Open,
    /// The session is finished; its handle only reports errors now.
    Closed,
}

/// Why a session closed.
///
/// Reported exactly once per session, as the final
/// [`SessionEvent::Closed`](crate::SessionEvent::Closed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The owner called [`close`](crate::SessionHandle::close) or dropped
    /// every handle.
    Explicit,
    /// The peer closed the connection.
    PeerClosed,
    /// The transport failed to connect, send, or receive.
    Transport(String),
    /// The liveness watchdog fired.
    HeartbeatTimeout,
    /// The accepting peer rejected our credential.
    AuthorizationRejected(String),
}

impl CloseReason {
    /// Whether the close was caused by a credential rejection.
    ///
    /// Callers use this to decide against reconnecting with the same
    /// credential.
    pub fn is_authorization_rejected(&self) -> bool {
        matches!(self, Self::AuthorizationRejected(_))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => f.write_str("closed locally"),
            Self::PeerClosed => f.write_str("closed by peer"),
            Self::Transport(e) => write!(f, "transport failure: {e}"),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            Self::AuthorizationRejected(e) => write!(f, "authorization rejected: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rejection_counts_as_authorization_failure() {
        assert!(CloseReason::AuthorizationRejected("Forbidden".into()).is_authorization_rejected());
        assert!(!CloseReason::HeartbeatTimeout.is_authorization_rejected());
        assert!(!CloseReason::Transport("reset".into()).is_authorization_rejected());
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::HeartbeatTimeout.to_string(), "heartbeat timeout");
        assert_eq!(
            CloseReason::AuthorizationRejected("Forbidden".into()).to_string(),
            "authorization rejected: Forbidden"
        );
    }
}
