//! The packet taxonomy and its tag table.
//!
//! A frame on the wire is a `u16` big-endian tag followed by the body of one
//! [`Packet`] variant:
//!
//! ```text
//! ┌──────────┬───────────────────────────────┐
//! │ tag: u16 │ body: variant fields in order │
//! └──────────┴───────────────────────────────┘
//! ```
//!
//! The tags are written out by hand in [`PacketKind`]. Both peers compile the
//! same table, so a tag always names the same variant no matter what order
//! code happens to be loaded in. Never renumber an existing kind; append new
//! ones with the next free tag.

use std::fmt;

use crate::codec::{
    sizeof_string, ByteReader, ByteWriter, WireRecord, BOOL, U16,
};
use crate::records::{ChannelRecord, MessageRecord, UserRecord};
use crate::ProtocolError;

/// Width of the leading tag on every frame.
pub const TAG_WIDTH: usize = U16;

// ---------------------------------------------------------------------------
// PacketKind — the tag table
// ---------------------------------------------------------------------------

/// Identity of a packet variant, with its stable wire tag as discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketKind {
    Ping = 0,
    Authorization = 1,
    AuthorizationResult = 2,
    NewMessage = 3,
    NewChannel = 4,
    UserJoined = 5,
    UserStatusChanged = 6,
}

impl PacketKind {
    /// Every kind, in tag order.
    pub const ALL: [PacketKind; 7] = [
        PacketKind::Ping,
        PacketKind::Authorization,
        PacketKind::AuthorizationResult,
        PacketKind::NewMessage,
        PacketKind::NewChannel,
        PacketKind::UserJoined,
        PacketKind::UserStatusChanged,
    ];

    /// The wire tag for this kind.
    pub const fn tag(self) -> u16 {
        self as u16
    }

    /// Looks up the kind registered under `tag`.
    pub fn from_tag(tag: u16) -> Option<Self> {
        Some(match tag {
            0 => Self::Ping,
            1 => Self::Authorization,
            2 => Self::AuthorizationResult,
            3 => Self::NewMessage,
            4 => Self::NewChannel,
            5 => Self::UserJoined,
            6 => Self::UserStatusChanged,
            _ => return None,
        })
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// AuthorizationResult
// ---------------------------------------------------------------------------

/// Outcome of the accepting peer's credential check.
///
/// On the wire: `success: bool`, followed by `error: string` only when
/// `success` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResult {
    Accepted,
    Rejected { error: String },
}

impl AuthorizationResult {
    /// Shorthand for a rejection with the given error text.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self::Rejected {
            error: error.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl WireRecord for AuthorizationResult {
    fn wire_size(&self) -> usize {
        match self {
            Self::Accepted => BOOL,
            Self::Rejected { error } => BOOL + sizeof_string(error),
        }
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        match self {
            Self::Accepted => w.write_bool(true),
            Self::Rejected { error } => {
                w.write_bool(false)?;
                w.write_string(error)
            }
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        if r.read_bool()? {
            Ok(Self::Accepted)
        } else {
            Ok(Self::Rejected {
                error: r.read_string()?,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// Every message that travels over a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Heartbeat. Empty body.
    Ping,

    /// Client → server: credential sent in-band, for transports that cannot
    /// carry it as a connection parameter.
    Authorization { token: String },

    /// Server → client: result of the handshake.
    AuthorizationResult(AuthorizationResult),

    /// A message was posted in a channel the receiver can see.
    NewMessage(MessageRecord),

    /// A channel was created in a server the receiver belongs to.
    NewChannel(ChannelRecord),

    /// A user joined one of the receiver's servers.
    UserJoined { user: UserRecord, server: String },

    /// A co-member went online or offline.
    UserStatusChanged { user: String, online: bool },
}

impl Packet {
    /// The variant's identity.
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Ping => PacketKind::Ping,
            Self::Authorization { .. } => PacketKind::Authorization,
            Self::AuthorizationResult(_) => PacketKind::AuthorizationResult,
            Self::NewMessage(_) => PacketKind::NewMessage,
            Self::NewChannel(_) => PacketKind::NewChannel,
            Self::UserJoined { .. } => PacketKind::UserJoined,
            Self::UserStatusChanged { .. } => PacketKind::UserStatusChanged,
        }
    }

    /// The variant's wire tag.
    pub fn tag(&self) -> u16 {
        self.kind().tag()
    }

    /// Exact size of the body, excluding the tag.
    pub fn body_size(&self) -> usize {
        match self {
            Self::Ping => 0,
            Self::Authorization { token } => sizeof_string(token),
            Self::AuthorizationResult(result) => result.wire_size(),
            Self::NewMessage(message) => message.wire_size(),
            Self::NewChannel(channel) => channel.wire_size(),
            Self::UserJoined { user, server } => user.wire_size() + sizeof_string(server),
            Self::UserStatusChanged { user, .. } => sizeof_string(user) + BOOL,
        }
    }

    /// Exact size of the whole frame.
    pub fn frame_size(&self) -> usize {
        TAG_WIDTH + self.body_size()
    }

    /// Encodes the packet into a frame allocated at exactly
    /// [`frame_size`](Self::frame_size) bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; self.frame_size()];
        let mut w = ByteWriter::new(&mut buf);
        w.write_u16(self.tag())?;
        self.encode_body(&mut w)?;
        w.finish()?;
        Ok(buf)
    }

    fn encode_body(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        match self {
            Self::Ping => Ok(()),
            Self::Authorization { token } => w.write_string(token),
            Self::AuthorizationResult(result) => result.encode(w),
            Self::NewMessage(message) => message.encode(w),
            Self::NewChannel(channel) => channel.encode(w),
            Self::UserJoined { user, server } => {
                user.encode(w)?;
                w.write_string(server)
            }
            Self::UserStatusChanged { user, online } => {
                w.write_string(user)?;
                w.write_bool(*online)
            }
        }
    }

    /// Decodes one frame: reads the tag, looks it up in the tag table, then
    /// decodes that variant's body. The body must fill the rest of the frame.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownPacketType`] for a tag not in the table
    /// - [`ProtocolError::TruncatedFrame`] if the frame ends early
    /// - [`ProtocolError::TrailingBytes`] if bytes remain after the body
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(frame);
        let tag = r.read_u16()?;
        let kind = PacketKind::from_tag(tag).ok_or(ProtocolError::UnknownPacketType(tag))?;

        let packet = match kind {
            PacketKind::Ping => Self::Ping,
            PacketKind::Authorization => Self::Authorization {
                token: r.read_string()?,
            },
            PacketKind::AuthorizationResult => {
                Self::AuthorizationResult(AuthorizationResult::decode(&mut r)?)
            }
            PacketKind::NewMessage => Self::NewMessage(MessageRecord::decode(&mut r)?),
            PacketKind::NewChannel => Self::NewChannel(ChannelRecord::decode(&mut r)?),
            PacketKind::UserJoined => Self::UserJoined {
                user: UserRecord::decode(&mut r)?,
                server: r.read_string()?,
            },
            PacketKind::UserStatusChanged => Self::UserStatusChanged {
                user: r.read_string()?,
                online: r.read_bool()?,
            },
        };

        r.finish()?;
        Ok(packet)
    }
}

// =========================================================================
// Tests
// =========================================================================
