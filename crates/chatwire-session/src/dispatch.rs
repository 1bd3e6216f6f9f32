//! Routing decoded packets by kind.
//!
//! Every [`Packet`] variant maps to exactly one [`Route`]. The match below is
//! exhaustive, so adding a packet kind without deciding where it goes is a
//! compile error rather than a frame that silently disappears.

use chatwire_protocol::{AuthorizationResult, ChannelRecord, MessageRecord, Packet, UserRecord};

/// A chat-level event carried by a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A message was posted in a channel.
    Message(MessageRecord),
    /// A channel was created.
    ChannelCreated(ChannelRecord),
    /// A user joined a server.
    UserJoined { user: UserRecord, server: String },
    /// A user came online or went offline.
    UserStatusChanged { user: String, online: bool },
}

impl From<ChatEvent> for Packet {
    fn from(event: ChatEvent) -> Self {
        match event {
            ChatEvent::Message(msg) => Packet::NewMessage(msg),
            ChatEvent::ChannelCreated(channel) => Packet::NewChannel(channel),
            ChatEvent::UserJoined { user, server } => Packet::UserJoined { user, server },
            ChatEvent::UserStatusChanged { user, online } => {
                Packet::UserStatusChanged { user, online }
            }
        }
    }
}

/// Where a packet goes once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Heartbeat: refreshes the liveness timestamp.
    Liveness,
    /// The accepting peer's answer to our credential.
    Handshake(AuthorizationResult),
    /// An in-band credential from the connecting peer.
    Credential(String),
    /// A chat event for the session owner.
    Event(ChatEvent),
}

/// Routes one decoded packet.
pub fn route(packet: Packet) -> Route {
    match packet {
        Packet::Ping => Route::Liveness,
        Packet::Authorization { token } => Route::Credential(token),
        Packet::AuthorizationResult(result) => Route::Handshake(result),
        Packet::NewMessage(msg) => Route::Event(ChatEvent::Message(msg)),
        Packet::NewChannel(channel) => Route::Event(ChatEvent::ChannelCreated(channel)),
        Packet::UserJoined { user, server } => Route::Event(ChatEvent::UserJoined { user, server }),
        Packet::UserStatusChanged { user, online } => {
            Route::Event(ChatEvent::UserStatusChanged { user, online })
        }
    }
}
