//! `ChatClient`: one live session, reconnect policy, and auth invalidation.
//!
//! The client is an actor task. It holds at most one session and at most
//! one scheduled reconnect, and turns session events into [`ClientEvent`]s
//! for the application.
//!
//! # Reconnect policy
//!
//! - A session that closes for any reason other than an authorization
//!   rejection produces `Disconnected(reason)` and, unless the close was a
//!   manual [`disconnect`](ChatClient::disconnect), exactly one reconnect
//!   after [`ClientConfig::reconnect_delay`].
//! - A rejection produces `AuthInvalid` and no reconnect. The rejected
//!   credential is remembered by fingerprint: connecting with it again is a
//!   logged no-op until a different credential is supplied.

use std::sync::Arc;
use std::time::Duration;

use chatwire_protocol::{ChannelRecord, MessageRecord, Packet, UserRecord};
use chatwire_session::{
    ChatEvent, CloseReason, ConnectionSession, CredentialFingerprint, SessionConfig,
    SessionError, SessionEvent, SessionEvents, SessionHandle, SessionState,
};
use chatwire_transport::Connector;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::ChatwireError;

// ---------------------------------------------------------------------------
// Config, events, status
// ---------------------------------------------------------------------------

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timing for each session the client opens.
    pub session: SessionConfig,

    /// Delay before the single reconnect attempt after an unexpected close.
    /// `None` disables reconnecting.
    ///
    /// Default: 2 seconds.
    pub reconnect_delay: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            reconnect_delay: Some(Duration::from_secs(2)),
        }
    }
}

/// What the client reports to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The transport is up.
    Connected,
    /// The session closed for a reason other than an authorization
    /// rejection.
    Disconnected(CloseReason),
    /// The server rejected the credential. No reconnect will happen with it.
    AuthInvalid { reason: String },
    Message(MessageRecord),
    ChannelCreated(ChannelRecord),
    UserJoined { user: UserRecord, server: String },
    UserStatusChanged { user: String, online: bool },
}

impl From<ChatEvent> for ClientEvent {
    fn from(event: ChatEvent) -> Self {
        match event {
            ChatEvent::Message(msg) => Self::Message(msg),
            ChatEvent::ChannelCreated(channel) => Self::ChannelCreated(channel),
            ChatEvent::UserJoined { user, server } => Self::UserJoined { user, server },
            ChatEvent::UserStatusChanged { user, online } => {
                Self::UserStatusChanged { user, online }
            }
        }
    }
}

/// Receiving end of a client's events.
pub type ClientEvents = mpsc::UnboundedReceiver<ClientEvent>;

/// A snapshot of the client's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    /// State of the current session, `None` when there is none.
    pub session: Option<SessionState>,
    /// `false` after a rejection, until a different credential is supplied.
    pub auth_valid: bool,
    /// Whether a reconnect is pending.
    pub reconnect_scheduled: bool,
    /// Sessions started since the client was created.
    pub connect_attempts: u64,
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

enum ClientCommand {
    Connect(String),
    Disconnect,
    Send {
        packet: Packet,
        reply: oneshot::Sender<Result<(), ChatwireError>>,
    },
    Status {
        reply: oneshot::Sender<ClientStatus>,
    },
}

/// Handle to a client actor.
///
/// Dropping the handle stops the actor and closes its session.
pub struct ChatClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl ChatClient {
    /// Spawns a client that opens sessions through `connector`.
    ///
    /// Nothing connects until [`connect`](Self::connect) is called. Must be
    /// called from within a Tokio runtime.
    pub fn new<K: Connector>(connector: K, config: ClientConfig) -> (Self, ClientEvents) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = ClientActor {
            connector: Arc::new(connector),
            config,
            commands: cmd_rx,
            events: event_tx,
            session: None,
            session_events: None,
            attempted: None,
            accepted: None,
            auth_valid: true,
            rejected: None,
            manual_close: false,
            reconnect_at: None,
            connect_attempts: 0,
        };
        tokio::spawn(actor.run());

        (Self { commands: cmd_tx }, event_rx)
    }

    /// Connects with `credential` unless a session is already open or
    /// connecting. A pending reconnect is replaced by this attempt.
    pub fn connect(&self, credential: impl Into<String>) -> Result<(), ChatwireError> {
        self.commands
            .send(ClientCommand::Connect(credential.into()))
            .map_err(|_| ChatwireError::ClientStopped)
    }

    /// Closes the current session without scheduling a reconnect.
    pub fn disconnect(&self) -> Result<(), ChatwireError> {
        self.commands
            .send(ClientCommand::Disconnect)
            .map_err(|_| ChatwireError::ClientStopped)
    }

    /// Sends a packet on the current session.
    pub async fn send(&self, packet: Packet) -> Result<(), ChatwireError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Send {
                packet,
                reply: reply_tx,
            })
            .map_err(|_| ChatwireError::ClientStopped)?;
        reply_rx.await.map_err(|_| ChatwireError::ClientStopped)?
    }

    /// Returns a snapshot of the client's state.
    pub async fn status(&self) -> Result<ClientStatus, ChatwireError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Status { reply: reply_tx })
            .map_err(|_| ChatwireError::ClientStopped)?;
        reply_rx.await.map_err(|_| ChatwireError::ClientStopped)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ClientActor<K> {
    connector: Arc<K>,
    config: ClientConfig,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedSender<ClientEvent>,

    session: Option<SessionHandle>,
    session_events: Option<SessionEvents>,

    /// Credential of the most recent session.
    attempted: Option<String>,
    /// Credential the server last accepted.
    accepted: Option<String>,
    auth_valid: bool,
    rejected: Option<CredentialFingerprint>,

    /// Set by `disconnect`; suppresses the reconnect for that close.
    manual_close: bool,
    reconnect_at: Option<Instant>,
    connect_attempts: u64,
}

impl<K: Connector> ClientActor<K> {
    async fn run(mut self) {
        debug!("chat client started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },
                event = next_event(&mut self.session_events) => self.on_session_event(event),
                _ = time::sleep_until(self.reconnect_at.unwrap_or_else(Instant::now)),
                    if self.reconnect_at.is_some() =>
                {
                    self.reconnect();
                }
            }
        }

        if let Some(session) = self.session.take() {
            session.close();
        }
        debug!("chat client stopped");
    }

    fn on_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Connect(credential) => self.connect(credential),
            ClientCommand::Disconnect => {
                self.reconnect_at = None;
                if let Some(session) = &self.session {
                    info!(session = %session.id(), "disconnecting");
                    self.manual_close = true;
                    session.close();
                }
            }
            ClientCommand::Send { packet, reply } => {
                let result = match &self.session {
                    Some(session) => session.send(&packet).map_err(ChatwireError::from),
                    None => Err(SessionError::Closed.into()),
                };
                let _ = reply.send(result);
            }
            ClientCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn connect(&mut self, credential: String) {
        if let Some(session) = &self.session {
            debug!(session = %session.id(), state = ?session.state(), "already connected");
            return;
        }

        if !self.auth_valid {
            if let Some(fingerprint) = self.rejected.filter(|fp| fp.matches(&credential)) {
                warn!(?fingerprint, "credential was rejected before, not connecting");
                return;
            }
            info!("connecting with a new credential");
            self.auth_valid = true;
            self.rejected = None;
        }

        self.reconnect_at = None;
        self.manual_close = false;
        self.connect_attempts += 1;

        let session = ConnectionSession::initiate(
            Arc::clone(&self.connector),
            credential.clone(),
            self.config.session.clone(),
        );
        info!(session = %session.handle.id(), attempt = self.connect_attempts, "connecting");

        let (handle, events) = session.into_parts();
        self.session = Some(handle);
        self.session_events = Some(events);
        self.attempted = Some(credential);
    }

    fn reconnect(&mut self) {
        self.reconnect_at = None;
        let Some(credential) = self.accepted.clone().or_else(|| self.attempted.clone()) else {
            return;
        };
        debug!("reconnecting");
        self.connect(credential);
    }

    fn on_session_event(&mut self, event: Option<SessionEvent>) {
        let Some(event) = event else {
            self.session = None;
            self.session_events = None;
            return;
        };

        match event {
            SessionEvent::Opened => self.emit(ClientEvent::Connected),
            SessionEvent::Authorized => {
                debug!("credential accepted");
                self.accepted = self.attempted.clone();
            }
            SessionEvent::AuthorizationRejected(reason) => self.on_rejected(reason),
            SessionEvent::Chat(event) => self.emit(event.into()),
            SessionEvent::Closed(reason) => self.on_closed(reason),
        }
    }

    /// The session is finished once the peer rejects the credential. It is
    /// released here, before its `Closed` arrives, so a `connect` with a
    /// different credential can start right away.
    fn on_rejected(&mut self, reason: String) {
        debug!(%reason, "credential rejected");
        self.session = None;
        self.session_events = None;
        self.reconnect_at = None;
        self.invalidate_credential();
        self.emit(ClientEvent::AuthInvalid { reason });
    }

    fn on_closed(&mut self, reason: CloseReason) {
        if let CloseReason::AuthorizationRejected(rejection) = reason {
            self.on_rejected(rejection);
            return;
        }
        self.session = None;
        self.session_events = None;

        let manual = std::mem::take(&mut self.manual_close);
        self.emit(ClientEvent::Disconnected(reason.clone()));

        match self.config.reconnect_delay {
            Some(delay) if !manual => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                info!(%reason, delay_ms, "scheduling reconnect");
                self.reconnect_at = Some(Instant::now() + delay);
            }
            _ => debug!(%reason, manual, "not reconnecting"),
        }
    }

    fn invalidate_credential(&mut self) {
        self.auth_valid = false;
        self.rejected = self.attempted.as_deref().map(CredentialFingerprint::of);
        if self.accepted == self.attempted {
            self.accepted = None;
        }
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            session: self.session.as_ref().map(SessionHandle::state),
            auth_valid: self.auth_valid,
            reconnect_scheduled: self.reconnect_at.is_some(),
            connect_attempts: self.connect_attempts,
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

/// Next event of the current session; pends forever when there is none.
async fn next_event(events: &mut Option<SessionEvents>) -> Option<SessionEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
