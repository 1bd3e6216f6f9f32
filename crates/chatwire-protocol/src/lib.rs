//! Wire protocol for Chatwire.
//!
//! This crate defines what the client and server say to each other over a
//! live connection, and exactly how it is laid out in bytes:
//!
//! - **Codec** ([`ByteWriter`], [`ByteReader`], [`WireRecord`]) — fixed
//!   capacity primitives. Every buffer is allocated at its exact computed
//!   size before encoding, so `len(encode(v)) == v.wire_size()` always.
//! - **Records** ([`MessageRecord`], [`ChannelRecord`], [`UserRecord`]) —
//!   the chat entities carried inside packets.
//! - **Packets** ([`Packet`], [`PacketKind`]) — the closed set of frame
//!   kinds, each with a hand-assigned stable tag.
//! - **Errors** ([`ProtocolError`]) — everything that can go wrong with one
//!   frame. None of them are fatal to a connection.
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Protocol (Packet) → Session (handshake, heartbeat)
//! ```
//!
//! The protocol layer knows nothing about connections or timing.

mod codec;
mod error;
mod packet;
mod records;

pub use codec::{
    decode_record, encode_record, sizeof_string, ByteReader, ByteWriter, WireRecord, BOOL,
    STRING_PREFIX, U16, U64,
};
pub use error::ProtocolError;
pub use packet::{AuthorizationResult, Packet, PacketKind, TAG_WIDTH};
pub use records::{unix_millis, ChannelRecord, MessageRecord, UserRecord};
