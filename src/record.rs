//! Records and the shared frame codec
//!
//! A [`Record`] is the logical mutation unit. The same frame layout is used
//! for WAL entries and for the data segment of a sorted run:
//!
//! ```text
//! ┌─────────┬───────────────┬───────────┬─────────────┬─────────────┬─────┬───────┐
//! │ CRC (4) │ Timestamp (8) │ Flags (1) │ KeyLen (8)  │ ValLen (8)  │ Key │ Value │
//! └─────────┴───────────────┴───────────┴─────────────┴─────────────┴─────┴───────┘
//! CRC       = crc32(key ‖ value)
//! Timestamp = nanoseconds since the Unix epoch
//! Flags     = bit 0 tombstone, bit 1 WAL flush marker
//! ```
//!
//! All integers are little-endian.

use std::io::{ErrorKind, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StrataError};

/// Size of the fixed part of a frame
pub const FRAME_HEADER_SIZE: usize = 4 + 8 + 1 + 8 + 8;

pub(crate) const FLAG_TOMBSTONE: u8 = 0x01;
pub(crate) const FLAG_FLUSH_MARKER: u8 = 0x02;

/// Upper bound for a single key or value; larger lengths mean a garbled header
pub(crate) const MAX_FIELD_LEN: u64 = 1 << 31;

// =============================================================================
// Record
// =============================================================================

/// A single versioned mutation of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// crc32 over key ‖ value
    pub checksum: u32,
    /// Nanoseconds since the Unix epoch
    pub timestamp: u64,
    /// Marks the key deleted as of `timestamp`
    pub tombstone: bool,
    pub key: Vec<u8>,
    /// Always `None` for tombstones
    pub value: Option<Vec<u8>>,
}

impl Record {
    /// A live value
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: u64) -> Self {
        let key = key.into();
        let value = value.into();
        Self {
            checksum: Self::checksum_of(&key, &value),
            timestamp,
            tombstone: false,
            key,
            value: Some(value),
        }
    }

    /// A deletion marker
    pub fn tombstone(key: impl Into<Vec<u8>>, timestamp: u64) -> Self {
        let key = key.into();
        Self {
            checksum: Self::checksum_of(&key, &[]),
            timestamp,
            tombstone: true,
            key,
            value: None,
        }
    }

    /// crc32 over key ‖ value
    pub fn checksum_of(key: &[u8], value: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(key);
        hasher.update(value);
        hasher.finalize()
    }

    /// Whether the stored checksum matches the payload
    pub fn is_intact(&self) -> bool {
        self.checksum == Self::checksum_of(&self.key, self.value_bytes())
    }

    /// Value bytes, empty for a tombstone
    pub fn value_bytes(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }

    /// Size of this record once framed
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.key.len() + self.value_bytes().len()
    }

    /// What a reader should see for this record
    pub fn lookup(&self) -> Lookup {
        match (&self.value, self.tombstone) {
            (Some(value), false) => Lookup::Found(value.clone()),
            _ => Lookup::Deleted,
        }
    }

    pub(crate) fn flags(&self) -> u8 {
        if self.tombstone {
            FLAG_TOMBSTONE
        } else {
            0
        }
    }

    /// Append this record as a frame
    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        encode_frame(
            buf,
            self.checksum,
            self.timestamp,
            self.flags(),
            &self.key,
            self.value_bytes(),
        );
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Lookup Result
// =============================================================================

/// Outcome of a point lookup: found, deleted (tombstone), or never written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Vec<u8>),
    Deleted,
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// The value, if the key is live
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }
}

// =============================================================================
// Frame Codec
// =============================================================================

/// Fixed-size frame prefix
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub checksum: u32,
    pub timestamp: u64,
    pub flags: u8,
    pub key_len: u64,
    pub value_len: u64,
}

impl FrameHeader {
    /// Parse from at least `FRAME_HEADER_SIZE` bytes
    pub fn parse(mut buf: &[u8]) -> Self {
        Self {
            checksum: buf.get_u32_le(),
            timestamp: buf.get_u64_le(),
            flags: buf.get_u8(),
            key_len: buf.get_u64_le(),
            value_len: buf.get_u64_le(),
        }
    }

    /// Payload length, or `None` when the lengths are implausible
    pub fn body_len(&self) -> Option<usize> {
        if self.key_len > MAX_FIELD_LEN || self.value_len > MAX_FIELD_LEN {
            return None;
        }
        Some((self.key_len + self.value_len) as usize)
    }

    fn into_record(self, body: &[u8]) -> Record {
        let key_len = self.key_len as usize;
        let tombstone = self.flags & FLAG_TOMBSTONE != 0;
        let key = body[..key_len].to_vec();
        let value = if tombstone {
            None
        } else {
            Some(body[key_len..].to_vec())
        };
        Record {
            checksum: self.checksum,
            timestamp: self.timestamp,
            tombstone,
            key,
            value,
        }
    }
}

pub(crate) fn encode_frame(
    buf: &mut BytesMut,
    checksum: u32,
    timestamp: u64,
    flags: u8,
    key: &[u8],
    value: &[u8],
) {
    buf.reserve(FRAME_HEADER_SIZE + key.len() + value.len());
    buf.put_u32_le(checksum);
    buf.put_u64_le(timestamp);
    buf.put_u8(flags);
    buf.put_u64_le(key.len() as u64);
    buf.put_u64_le(value.len() as u64);
    buf.put_slice(key);
    buf.put_slice(value);
}

/// Result of decoding one frame from an in-memory buffer
#[derive(Debug)]
pub(crate) enum Decoded {
    /// A complete frame; checksum not yet verified
    Frame { flags: u8, record: Record, len: usize },
    /// The buffer ends before the frame does
    Incomplete,
    /// The header is garbled
    Malformed(String),
}

/// Decode the frame at the start of `buf`
pub(crate) fn decode_frame(buf: &[u8]) -> Decoded {
    if buf.len() < FRAME_HEADER_SIZE {
        return Decoded::Incomplete;
    }
    let header = FrameHeader::parse(&buf[..FRAME_HEADER_SIZE]);
    let body_len = match header.body_len() {
        Some(len) => len,
        None => {
            return Decoded::Malformed(format!(
                "implausible lengths key={} value={}",
                header.key_len, header.value_len
            ))
        }
    };
    let len = FRAME_HEADER_SIZE + body_len;
    if buf.len() < len {
        return Decoded::Incomplete;
    }
    Decoded::Frame {
        flags: header.flags,
        record: header.into_record(&buf[FRAME_HEADER_SIZE..len]),
        len,
    }
}

/// Read and verify one frame from a run's data segment.
///
/// Returns `Ok(None)` on a clean end of stream. A short read or checksum
/// mismatch is corruption: runs are written completely before they are linked.
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> Result<Option<(Record, u64)>> {
    let mut header_buf = [0u8; FRAME_HEADER_SIZE];
    let read = read_fully(reader, &mut header_buf)?;
    if read == 0 {
        return Ok(None);
    }
    if read < FRAME_HEADER_SIZE {
        return Err(StrataError::Corruption(format!(
            "truncated record header ({} of {} bytes)",
            read, FRAME_HEADER_SIZE
        )));
    }

    let header = FrameHeader::parse(&header_buf);
    let body_len = header.body_len().ok_or_else(|| {
        StrataError::Corruption(format!(
            "implausible record lengths key={} value={}",
            header.key_len, header.value_len
        ))
    })?;

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => {
            StrataError::Corruption("truncated record body".to_string())
        }
        _ => StrataError::Io(e),
    })?;

    let record = header.into_record(&body);
    if !record.is_intact() {
        return Err(StrataError::Corruption(format!(
            "checksum mismatch for key {:?}",
            String::from_utf8_lossy(&record.key)
        )));
    }
    Ok(Some((record, (FRAME_HEADER_SIZE + body_len) as u64)))
}

/// Like `read_exact`, but reports how many bytes were available before EOF
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(StrataError::Io(e)),
        }
    }
    Ok(filled)
}
