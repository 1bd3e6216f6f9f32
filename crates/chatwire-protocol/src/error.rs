//! Error types for the protocol layer.
//!
//! Every variant is local to one frame: the frame that produced it is
//! dropped and the connection carries on.

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ended before a field of the declared width could be read.
    #[error("truncated frame: needed {needed} bytes, {remaining} remaining")]
    TruncatedFrame { needed: usize, remaining: usize },

    /// The leading tag is not in the packet table.
    #[error("unknown packet type {0}")]
    UnknownPacketType(u16),

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A boolean field held something other than 0 or 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A string is too long for the `u32` length prefix.
    #[error("string of {0} bytes exceeds the length prefix")]
    StringTooLong(usize),

    /// The frame decoded cleanly but bytes were left over.
    #[error("{0} trailing bytes after frame body")]
    TrailingBytes(usize),

    /// An encoder tried to write past the buffer it sized for itself.
    ///
    /// This means a record's `wire_size` under-counts its fields.
    #[error("encode overflow: needed {needed} bytes, {remaining} remaining")]
    Overflow { needed: usize, remaining: usize },

    /// An encoder wrote fewer bytes than its `wire_size` declared.
    #[error("encoded size mismatch: declared {declared}, wrote {written}")]
    SizeMismatch { declared: usize, written: usize },
}

impl ProtocolError {
    /// Returns `true` for errors that indicate a bug in an encoder rather
    /// than bad input from the peer.
    pub fn is_encoder_bug(&self) -> bool {
        matches!(self, Self::Overflow { .. } | Self::SizeMismatch { .. })
    }
}
