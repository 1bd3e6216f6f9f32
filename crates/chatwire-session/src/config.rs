//! Session timing configuration.

use std::time::Duration;

/// Timing knobs for a [`ConnectionSession`](crate::ConnectionSession).
///
/// The defaults are the values both peers agree on; change them on one side
/// only if you know the other side's settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the initiator sends a `Ping` while the session is open.
    ///
    /// Default: 5 seconds.
    pub heartbeat_interval: Duration,

    /// How often the liveness watchdog checks the last-ping timestamp.
    ///
    /// Default: 1 second.
    pub liveness_check_interval: Duration,

    /// Initiator: close the session when no `Ping` has been received for
    /// longer than this.
    ///
    /// Default: 10 seconds.
    pub heartbeat_timeout: Duration,

    /// Responder: same watchdog for the accepting side. `None` relies solely
    /// on the transport reporting the close.
    ///
    /// Default: 15 seconds, so a client that pings every 5 seconds can miss
    /// two heartbeats before it is dropped.
    pub responder_timeout: Option<Duration>,

    /// Responder: how long a rejected connection stays open so the failure
    /// packet can flush, and how long to wait for an in-band credential.
    ///
    /// Default: 5 seconds.
    pub auth_grace_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            liveness_check_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(10),
            responder_timeout: Some(Duration::from_secs(15)),
            auth_grace_period: Duration::from_secs(5),
        }
    }
}
