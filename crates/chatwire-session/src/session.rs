//! The per-connection session actor.
//!
//! Each session runs as its own Tokio task that owns the [`Connection`]. The
//! owner talks to it through a [`SessionHandle`] (commands in) and a
//! [`SessionEvents`] receiver (events out):
//!
//! ```text
//!   SessionHandle ──Command──→ ┌──────────────┐ ──frames──→ peer
//!                              │ session task │
//!   SessionEvents ←──Event──── └──────────────┘ ←─frames─── peer
//! ```
//!
//! The task's loop selects over four sources: owner commands, inbound
//! frames, the heartbeat timer (initiator only) and the liveness check.
//! Whatever ends the loop, the task publishes [`SessionState::Closed`] and
//! then emits exactly one [`SessionEvent::Closed`] as its final event.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chatwire_protocol::{AuthorizationResult, Packet, PacketKind, TAG_WIDTH};
use chatwire_transport::{Connection, Connector};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::dispatch::{self, ChatEvent, Route};
use crate::{
    Authorizer, CloseReason, CredentialFingerprint, Role, SessionConfig, SessionError,
    SessionState,
};

/// A `Ping` packet is its tag and nothing else.
const PING_FRAME: [u8; TAG_WIDTH] = PacketKind::Ping.tag().to_be_bytes();

/// Upper bound on closing the transport once the loop has ended.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Process-unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
}

// ---------------------------------------------------------------------------
// Events and commands
// ---------------------------------------------------------------------------

/// Something the session reports to its owner, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport is up (initiator sessions only).
    Opened,
    /// The accepting peer accepted our credential (initiator sessions only).
    Authorized,
    /// The accepting peer rejected our credential. A
    /// [`Closed`](Self::Closed) with the same reason follows.
    AuthorizationRejected(String),
    /// A chat event arrived from the peer.
    Chat(ChatEvent),
    /// The session closed. Always the last event.
    Closed(CloseReason),
}

/// Receiving end of a session's events.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug)]
enum Command {
    Send(Arc<[u8]>),
    Close,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle to a running session. Cheap to clone.
///
/// The session closes with [`CloseReason::Explicit`] when
/// [`close`](Self::close) is called or when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    role: Role,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// The session's identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Which end of the connection this session is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Shorthand for `state() == SessionState::Open`.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Encodes `packet` and queues it for sending.
    ///
    /// Frames queued while the session is still connecting are sent once it
    /// opens, in order.
    pub fn send(&self, packet: &Packet) -> Result<(), SessionError> {
        let frame = packet.encode()?;
        self.send_frame(frame.into())
    }

    /// Queues an already-encoded frame. Used to fan one encoding out to
    /// many sessions.
    pub fn send_frame(&self, frame: Arc<[u8]>) -> Result<(), SessionError> {
        if self.state() == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| SessionError::Closed)
    }

    /// Asks the session to close. Idempotent.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Waits until the session has closed.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // A dropped sender means the task is gone, which is closed as well.
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }
}

// ---------------------------------------------------------------------------
// ConnectionSession
// ---------------------------------------------------------------------------

/// A newly created session: the handle plus its event stream.
#[derive(Debug)]
pub struct ConnectionSession {
    pub handle: SessionHandle,
    pub events: SessionEvents,
}

impl ConnectionSession {
    /// Starts an initiator session that connects through `connector`.
    ///
    /// Returns immediately in [`SessionState::Connecting`]. The first event
    /// is [`SessionEvent::Opened`] once the transport is up, or
    /// [`SessionEvent::Closed`] with [`CloseReason::Transport`] if it never
    /// comes up.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn initiate<K: Connector>(
        connector: Arc<K>,
        credential: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        let credential = credential.into();
        let (session, wiring) = wire(Role::Initiator, SessionState::Connecting);

        tokio::spawn(async move {
            debug!(session = %wiring.id, "connecting");
            match connector.connect(&credential).await {
                Ok(conn) => {
                    info!(session = %wiring.id, conn = %conn.id(), "session open");
                    wiring.state.send_replace(SessionState::Open);
                    wiring.emit(SessionEvent::Opened);
                    Driver::new(conn, wiring, config, false).run().await;
                }
                Err(e) => {
                    warn!(session = %wiring.id, error = %e, "connect failed");
                    wiring.finish(CloseReason::Transport(e.to_string()));
                }
            }
        });

        session
    }

    /// Runs the accepting side of the handshake on `conn`.
    ///
    /// The credential comes from the transport if it carried one, otherwise
    /// from an in-band `Authorization` packet sent within
    /// [`auth_grace_period`](SessionConfig::auth_grace_period).
    ///
    /// On success the peer has been sent `Accepted` and a responder session
    /// is running. On rejection the peer is sent `Rejected`, the connection
    /// lingers for the grace period (or until the peer hangs up) so the
    /// packet can flush, and is then closed.
    pub async fn accept<C, A>(
        conn: C,
        authorizer: &A,
        config: SessionConfig,
    ) -> Result<(Self, A::Identity), SessionError>
    where
        C: Connection,
        A: Authorizer,
    {
        let credential = match credential_of(&conn, config.auth_grace_period).await {
            Ok(credential) => credential,
            Err(e) => {
                debug!(conn = %conn.id(), error = %e, "no credential presented");
                let _ = conn.close().await;
                return Err(e);
            }
        };

        let identity = match authorizer.authorize(&credential).await {
            Ok(identity) => identity,
            Err(e) => {
                let reason = match e {
                    SessionError::AuthorizationRejected(reason) => reason,
                    other => {
                        warn!(conn = %conn.id(), error = %other, "authorizer failed");
                        "Forbidden".to_owned()
                    }
                };
                info!(
                    conn = %conn.id(),
                    fingerprint = ?CredentialFingerprint::of(&credential),
                    %reason,
                    "authorization rejected"
                );
                reject(&conn, &reason, config.auth_grace_period).await;
                return Err(SessionError::AuthorizationRejected(reason));
            }
        };

        let accepted = Packet::AuthorizationResult(AuthorizationResult::Accepted).encode()?;
        if let Err(e) = conn.send(&accepted).await {
            let _ = conn.close().await;
            return Err(SessionError::transport(e));
        }

        let (session, wiring) = wire(Role::Responder, SessionState::Open);
        info!(session = %wiring.id, conn = %conn.id(), "session authorized");
        tokio::spawn(Driver::new(conn, wiring, config, true).run());

        Ok((session, identity))
    }

    /// Splits into handle and events.
    pub fn into_parts(self) -> (SessionHandle, SessionEvents) {
        (self.handle, self.events)
    }
}

async fn credential_of<C: Connection>(conn: &C, grace: Duration) -> Result<String, SessionError> {
    if let Some(credential) = conn.credential() {
        return Ok(credential.to_owned());
    }
    time::timeout(grace, read_credential(conn))
        .await
        .map_err(|_| SessionError::HandshakeTimeout)?
}

async fn read_credential<C: Connection>(conn: &C) -> Result<String, SessionError> {
    loop {
        let Some(frame) = conn.recv().await.map_err(SessionError::transport)? else {
            return Err(SessionError::Closed);
        };
        match Packet::decode(&frame).map(dispatch::route) {
            Ok(Route::Credential(token)) => return Ok(token),
            Ok(Route::Liveness) => conn
                .send(&PING_FRAME)
                .await
                .map_err(SessionError::transport)?,
            Ok(other) => debug!(conn = %conn.id(), ?other, "ignoring packet before credential"),
            Err(e) => warn!(conn = %conn.id(), error = %e, "dropping undecodable frame"),
        }
    }
}

async fn reject<C: Connection>(conn: &C, reason: &str, grace: Duration) {
    match Packet::AuthorizationResult(AuthorizationResult::rejected(reason)).encode() {
        Ok(frame) => {
            if let Err(e) = conn.send(&frame).await {
                debug!(conn = %conn.id(), error = %e, "failed to send rejection");
            }
        }
        Err(e) => warn!(conn = %conn.id(), error = %e, "failed to encode rejection"),
    }

    // Linger so the rejection reaches the peer before the close does.
    let _ = time::timeout(grace, async { while let Ok(Some(_)) = conn.recv().await {} }).await;

    if let Err(e) = conn.close().await {
        debug!(conn = %conn.id(), error = %e, "close after rejection failed");
    }
}

// ---------------------------------------------------------------------------
// Actor internals
// ---------------------------------------------------------------------------

/// The task side of the channels behind a [`SessionHandle`].
struct Wiring {
    id: SessionId,
    role: Role,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
}

impl Wiring {
    fn emit(&self, event: SessionEvent) {
        // The owner may have stopped listening; the session still runs.
        let _ = self.events.send(event);
    }

    fn finish(self, reason: CloseReason) {
        info!(session = %self.id, role = ?self.role, %reason, "session closed");
        self.state.send_replace(SessionState::Closed);
        self.emit(SessionEvent::Closed(reason));
    }
}

fn wire(role: Role, initial: SessionState) -> (ConnectionSession, Wiring) {
    let id = next_session_id();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(initial);

    let session = ConnectionSession {
        handle: SessionHandle {
            id,
            role,
            commands: cmd_tx,
            state: state_rx,
        },
        events: event_rx,
    };
    let wiring = Wiring {
        id,
        role,
        commands: cmd_rx,
        events: event_tx,
        state: state_tx,
    };
    (session, wiring)
}

/// Owns the connection for an open session and runs its loop.
struct Driver<C> {
    conn: C,
    wiring: Wiring,
    config: SessionConfig,
    last_ping: Instant,
    /// Longest the peer may stay silent, `None` for no limit.
    watchdog: Option<Duration>,
    authorized: bool,
}

impl<C: Connection> Driver<C> {
    fn new(conn: C, wiring: Wiring, config: SessionConfig, authorized: bool) -> Self {
        let watchdog = match wiring.role {
            Role::Initiator => Some(config.heartbeat_timeout),
            Role::Responder => config.responder_timeout,
        };
        Self {
            conn,
            wiring,
            config,
            last_ping: Instant::now(),
            watchdog,
            authorized,
        }
    }

    /// Writes one frame. A write still pending when the watchdog would fire
    /// ends the session with [`CloseReason::HeartbeatTimeout`], since the
    /// liveness check is not polled meanwhile.
    async fn write(&self, frame: &[u8]) -> Result<(), CloseReason> {
        let sent = match self.watchdog {
            Some(limit) => {
                let budget = limit.saturating_sub(self.last_ping.elapsed());
                match time::timeout(budget, self.conn.send(frame)).await {
                    Ok(sent) => sent,
                    Err(_) => {
                        warn!(
                            session = %self.wiring.id,
                            len = frame.len(),
                            "write stalled past the heartbeat timeout, closing"
                        );
                        return Err(CloseReason::HeartbeatTimeout);
                    }
                }
            }
            None => self.conn.send(frame).await,
        };
        sent.map_err(|e| CloseReason::Transport(e.to_string()))
    }

    async fn run(mut self) {
        let role = self.wiring.role;
        let start = Instant::now();

        let period = self.config.heartbeat_interval;
        let mut heartbeat = time::interval_at(start + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let sends_heartbeat = role == Role::Initiator;

        let check = self.config.liveness_check_interval;
        let mut liveness = time::interval_at(start + check, check);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let watchdog = self.watchdog;
        let limit = watchdog.unwrap_or(Duration::MAX);

        let reason = loop {
            tokio::select! {
                cmd = self.wiring.commands.recv() => match cmd {
                    Some(Command::Send(frame)) => {
                        if let Err(reason) = self.write(&frame).await {
                            break reason;
                        }
                    }
                    Some(Command::Close) | None => break CloseReason::Explicit,
                },
                frame = self.conn.recv() => match frame {
                    Ok(Some(frame)) => {
                        if let Some(reason) = self.on_frame(&frame).await {
                            break reason;
                        }
                    }
                    Ok(None) => break CloseReason::PeerClosed,
                    Err(e) => break CloseReason::Transport(e.to_string()),
                },
                _ = heartbeat.tick(), if sends_heartbeat => {
                    if let Err(reason) = self.write(&PING_FRAME).await {
                        break reason;
                    }
                }
                _ = liveness.tick(), if watchdog.is_some() => {
                    let silent_for = self.last_ping.elapsed();
                    if silent_for > limit {
                        let silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX);
                        warn!(
                            session = %self.wiring.id,
                            silent_ms,
                            "no heartbeat from peer, closing"
                        );
                        break CloseReason::HeartbeatTimeout;
                    }
                }
            }
        };

        if reason != CloseReason::PeerClosed {
            match time::timeout(CLOSE_TIMEOUT, self.conn.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(session = %self.wiring.id, error = %e, "transport close failed"),
                Err(_) => debug!(session = %self.wiring.id, "transport close timed out"),
            }
        }
        self.wiring.finish(reason);
    }

    /// Handles one inbound frame. Returns a reason when the frame ends the
    /// session.
    async fn on_frame(&mut self, frame: &[u8]) -> Option<CloseReason> {
        let packet = match Packet::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(
                    session = %self.wiring.id,
                    error = %e,
                    len = frame.len(),
                    "dropping undecodable frame"
                );
                return None;
            }
        };

        match dispatch::route(packet) {
            Route::Liveness => {
                self.last_ping = Instant::now();
                if self.wiring.role == Role::Responder {
                    if let Err(reason) = self.write(&PING_FRAME).await {
                        return Some(reason);
                    }
                }
            }
            Route::Handshake(result) => match (self.wiring.role, result) {
                (Role::Initiator, AuthorizationResult::Accepted) => {
                    debug!(session = %self.wiring.id, "authorized");
                    self.authorized = true;
                    self.wiring.emit(SessionEvent::Authorized);
                }
                (Role::Initiator, AuthorizationResult::Rejected { error }) => {
                    warn!(session = %self.wiring.id, %error, "authorization rejected by peer");
                    self.wiring
                        .emit(SessionEvent::AuthorizationRejected(error.clone()));
                    return Some(CloseReason::AuthorizationRejected(error));
                }
                (Role::Responder, _) => {
                    debug!(session = %self.wiring.id, "ignoring authorization result from initiator");
                }
            },
            Route::Credential(_) => {
                debug!(session = %self.wiring.id, "ignoring credential on an established session");
            }
            Route::Event(event) => {
                if self.authorized {
                    self.wiring.emit(SessionEvent::Chat(event));
                } else {
                    warn!(session = %self.wiring.id, "dropping event received before authorization");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_frame_matches_encoded_ping() {
        assert_eq!(Packet::Ping.encode().unwrap(), PING_FRAME.to_vec());
    }

    #[test]
    fn test_session_ids_are_unique_and_displayed() {
        let a = next_session_id();
        let b = next_session_id();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), format!("session-{}", a.into_inner()));
    }

    #[tokio::test]
    async fn test_handle_send_after_close_fails() {
        let (session, wiring) = wire(Role::Initiator, SessionState::Open);
        wiring.finish(CloseReason::Explicit);

        assert_eq!(session.handle.state(), SessionState::Closed);
        assert!(matches!(
            session.handle.send(&Packet::Ping),
            Err(SessionError::Closed)
        ));
        session.handle.closed().await;
    }

    #[tokio::test]
    async fn test_finish_emits_closed_as_final_event() {
        let (session, wiring) = wire(Role::Responder, SessionState::Open);
        let (_handle, mut events) = session.into_parts();
        wiring.finish(CloseReason::PeerClosed);

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Closed(CloseReason::PeerClosed))
        );
        assert_eq!(events.recv().await, None);
    }
}
