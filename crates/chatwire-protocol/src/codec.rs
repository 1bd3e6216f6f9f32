//! Byte-level codec: fixed-capacity writer and reader with a cursor.
//!
//! Nothing in this module grows a buffer. The caller asks a record for its
//! exact [`WireRecord::wire_size`], allocates once, and writes into that
//! allocation. This makes the encoded size known (and testable) before a
//! single byte is written.
//!
//! ## Primitive layout
//!
//! | Type     | Width                     | Encoding            |
//! |----------|---------------------------|---------------------|
//! | `u16`    | 2                         | big-endian          |
//! | `u64`    | 8                         | big-endian          |
//! | `bool`   | 1                         | `0` or `1`          |
//! | `string` | 4 + UTF-8 byte length     | `u32` BE length, then bytes |

use crate::ProtocolError;

/// Width of a `u16` field.
pub const U16: usize = 2;
/// Width of a `u64` field.
pub const U64: usize = 8;
/// Width of a `bool` field.
pub const BOOL: usize = 1;
/// Width of the length prefix in front of every string.
pub const STRING_PREFIX: usize = 4;

/// Encoded size of `s`: prefix plus UTF-8 byte length (not char count).
pub fn sizeof_string(s: &str) -> usize {
    STRING_PREFIX + s.len()
}

// ---------------------------------------------------------------------------
// WireRecord
// ---------------------------------------------------------------------------

/// A value that knows its exact encoded size and can write and read itself
/// through the byte codec.
///
/// `encode` and `decode` must visit the same fields in the same order, and
/// `wire_size` must equal the number of bytes `encode` writes for the
/// current field values.
pub trait WireRecord: Sized {
    /// Exact number of bytes [`encode`](Self::encode) will write.
    fn wire_size(&self) -> usize;

    /// Writes every field in wire order.
    fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError>;

    /// Reads every field in wire order.
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError>;
}

/// Encodes `record` into a buffer allocated at exactly its `wire_size`.
pub fn encode_record<T: WireRecord>(record: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = vec![0u8; record.wire_size()];
    let mut w = ByteWriter::new(&mut buf);
    record.encode(&mut w)?;
    w.finish()?;
    Ok(buf)
}

/// Decodes a record that must occupy the whole of `bytes`.
pub fn decode_record<T: WireRecord>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let mut r = ByteReader::new(bytes);
    let record = T::decode(&mut r)?;
    r.finish()?;
    Ok(record)
}

// ---------------------------------------------------------------------------
// ByteWriter
// ---------------------------------------------------------------------------

/// Writes primitives into a fixed-capacity buffer, advancing a cursor.
#[derive(Debug)]
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    /// Wraps `buf`. Its length is the capacity; it never grows.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Capacity left before the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let remaining = self.remaining();
        if bytes.len() > remaining {
            return Err(ProtocolError::Overflow {
                needed: bytes.len(),
                remaining,
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Writes a big-endian `u16`.
    pub fn write_u16(&mut self, n: u16) -> Result<(), ProtocolError> {
        self.put(&n.to_be_bytes())
    }

    /// Writes a big-endian `u64`.
    pub fn write_u64(&mut self, n: u64) -> Result<(), ProtocolError> {
        self.put(&n.to_be_bytes())
    }

    /// Writes a boolean as a single `0`/`1` byte.
    pub fn write_bool(&mut self, b: bool) -> Result<(), ProtocolError> {
        self.put(&[u8::from(b)])
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) -> Result<(), ProtocolError> {
        let len = u32::try_from(s.len()).map_err(|_| ProtocolError::StringTooLong(s.len()))?;
        // Check the whole field up front so a failed write leaves no prefix behind.
        let needed = sizeof_string(s);
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ProtocolError::Overflow { needed, remaining });
        }
        self.put(&len.to_be_bytes())?;
        self.put(s.as_bytes())
    }

    /// Verifies the buffer was filled exactly.
    pub fn finish(self) -> Result<(), ProtocolError> {
        if self.pos != self.buf.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: self.buf.len(),
                written: self.pos,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ByteReader
// ---------------------------------------------------------------------------

/// Reads primitives from a byte slice, advancing a cursor.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wraps `buf` with the cursor at the start.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ProtocolError::TruncatedFrame {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Reads a `0`/`1` boolean byte.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        match self.take_array::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBool(other)),
        }
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = u32::from_be_bytes(self.take_array()?) as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Verifies every byte was consumed.
    pub fn finish(self) -> Result<(), ProtocolError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(ProtocolError::TrailingBytes(extra)),
        }
    }
}
