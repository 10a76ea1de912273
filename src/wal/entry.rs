//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use bytes::BytesMut;

use crate::record::{encode_frame, Record, FLAG_FLUSH_MARKER, FRAME_HEADER_SIZE};

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalEntry {
    /// A put or a delete
    Mutation(Record),

    /// Everything logged before this point is durable in a sorted run
    FlushMarker { timestamp: u64 },
}

impl WalEntry {
    pub fn timestamp(&self) -> u64 {
        match self {
            WalEntry::Mutation(record) => record.timestamp,
            WalEntry::FlushMarker { timestamp } => *timestamp,
        }
    }

    pub fn is_flush_marker(&self) -> bool {
        matches!(self, WalEntry::FlushMarker { .. })
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            WalEntry::Mutation(record) => record.encoded_len(),
            WalEntry::FlushMarker { .. } => FRAME_HEADER_SIZE,
        }
    }

    /// Append the framed entry to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            WalEntry::Mutation(record) => record.encode_into(buf),
            WalEntry::FlushMarker { timestamp } => {
                encode_frame(buf, Record::checksum_of(&[], &[]), *timestamp, FLAG_FLUSH_MARKER, &[], &[])
            }
        }
    }

    /// Interpret a decoded frame
    pub(crate) fn from_frame(flags: u8, record: Record) -> Self {
        if flags & FLAG_FLUSH_MARKER != 0 {
            WalEntry::FlushMarker {
                timestamp: record.timestamp,
            }
        } else {
            WalEntry::Mutation(record)
        }
    }
}
