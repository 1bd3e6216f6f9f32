//! Chat records carried inside packets.
//!
//! Identifiers are opaque strings assigned by the persistence layer (the
//! server uses hex object ids). Field order in each `encode`/`decode` pair is
//! the wire order and must not change.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::codec::{sizeof_string, ByteReader, ByteWriter, WireRecord, U64};
use crate::ProtocolError;

/// A user as seen by other members of a server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UserRecord {
    pub id: String,
    pub username: String,
}

impl WireRecord for UserRecord {
    fn wire_size(&self) -> usize {
        sizeof_string(&self.id) + sizeof_string(&self.username)
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        w.write_string(&self.id)?;
        w.write_string(&self.username)
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_string()?,
            username: r.read_string()?,
        })
    }
}

/// A text channel inside a server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelRecord {
    pub id: String,
    pub server: String,
    pub name: String,
}

impl WireRecord for ChannelRecord {
    fn wire_size(&self) -> usize {
        sizeof_string(&self.id) + sizeof_string(&self.server) + sizeof_string(&self.name)
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        w.write_string(&self.id)?;
        w.write_string(&self.server)?;
        w.write_string(&self.name)
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_string()?,
            server: r.read_string()?,
            name: r.read_string()?,
        })
    }
}

/// A chat message.
///
/// `created_at_millis` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MessageRecord {
    pub id: String,
    pub author: String,
    pub channel: String,
    pub server: String,
    pub content: String,
    pub created_at_millis: u64,
}

impl MessageRecord {
    /// Creates a message stamped with the current wall-clock time.
    pub fn now(
        id: impl Into<String>,
        author: impl Into<String>,
        channel: impl Into<String>,
        server: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            channel: channel.into(),
            server: server.into(),
            content: content.into(),
            created_at_millis: unix_millis(SystemTime::now()),
        }
    }

    /// The creation time as a [`SystemTime`].
    pub fn created_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.created_at_millis)
    }
}

impl WireRecord for MessageRecord {
    fn wire_size(&self) -> usize {
        sizeof_string(&self.id)
            + sizeof_string(&self.author)
            + sizeof_string(&self.channel)
            + sizeof_string(&self.server)
            + sizeof_string(&self.content)
            + U64
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        w.write_string(&self.id)?;
        w.write_string(&self.author)?;
        w.write_string(&self.channel)?;
        w.write_string(&self.server)?;
        w.write_string(&self.content)?;
        w.write_u64(self.created_at_millis)
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_string()?,
            author: r.read_string()?,
            channel: r.read_string()?,
            server: r.read_string()?,
            content: r.read_string()?,
            created_at_millis: r.read_u64()?,
        })
    }
}

/// Milliseconds since the Unix epoch, saturating at zero for earlier times.
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_record, encode_record};

    fn sample_message() -> MessageRecord {
        MessageRecord {
            id: "m1".into(),
            author: "u1".into(),
            channel: "c1".into(),
            server: "s1".into(),
            content: "hi".into(),
            created_at_millis: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_message_record_size_is_strings_plus_time_field() {
        let msg = sample_message();
        // Five strings of two bytes each (4-byte prefix + 2) plus 8 for the time.
        assert_eq!(msg.wire_size(), 5 * 6 + 8);
    }

    #[test]
    fn test_message_record_round_trip_field_for_field() {
        let msg = sample_message();
        let declared = msg.wire_size();

        let bytes = encode_record(&msg).unwrap();
        assert_eq!(bytes.len(), declared);

        let decoded: MessageRecord = decode_record(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.created_at_millis, 1_700_000_000_000);
    }

    #[test]
    fn test_message_record_time_is_last_eight_bytes() {
        let bytes = encode_record(&sample_message()).unwrap();
        let tail: [u8; 8] = bytes[bytes.len() - 8..].try_into().unwrap();
        assert_eq!(u64::from_be_bytes(tail), 1_700_000_000_000);
    }

    #[test]
    fn test_user_record_round_trip_with_unicode() {
        let user = UserRecord {
            id: "65a1f0".into(),
            username: "Zoë 🦀".into(),
        };
        let bytes = encode_record(&user).unwrap();
        assert_eq!(bytes.len(), user.wire_size());
        assert_eq!(decode_record::<UserRecord>(&bytes).unwrap(), user);
    }

    #[test]
    fn test_channel_record_round_trip_with_empty_name() {
        let channel = ChannelRecord {
            id: "c9".into(),
            server: "s1".into(),
            name: String::new(),
        };
        let bytes = encode_record(&channel).unwrap();
        assert_eq!(bytes.len(), 6 + 6 + 4);
        assert_eq!(decode_record::<ChannelRecord>(&bytes).unwrap(), channel);
    }

    #[test]
    fn test_truncated_message_record_fails() {
        let bytes = encode_record(&sample_message()).unwrap();
        let result = decode_record::<MessageRecord>(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::TruncatedFrame { .. })));
    }

    #[test]
    fn test_message_now_stamps_current_time() {
        let before = unix_millis(SystemTime::now());
        let msg = MessageRecord::now("m", "a", "c", "s", "x");
        let after = unix_millis(SystemTime::now());
        assert!(msg.created_at_millis >= before && msg.created_at_millis <= after);
        assert_eq!(unix_millis(msg.created_at()), msg.created_at_millis);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_message_record_json_shape() {
        let json = serde_json::to_value(sample_message()).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["created_at_millis"], 1_700_000_000_000u64);
    }
}
