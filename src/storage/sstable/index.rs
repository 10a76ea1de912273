//! Index segment
//!
//! One entry per record, in key order:
//!
//! ```text
//! [KeyLen: u64][Key][DataOffset: u64]
//! ```
//!
//! Lookups never scan the whole segment: the summary narrows the search to a
//! byte bracket and only that bracket is read.

use std::io::{Read, Seek, SeekFrom};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StrataError};
use crate::record::MAX_FIELD_LEN;

/// Encoded size of the entry for `key`
pub(crate) fn entry_len(key: &[u8]) -> u64 {
    8 + key.len() as u64 + 8
}

pub(crate) fn encode_entry(buf: &mut BytesMut, key: &[u8], data_offset: u64) {
    buf.put_u64_le(key.len() as u64);
    buf.put_slice(key);
    buf.put_u64_le(data_offset);
}

/// Decode the entry at the front of `buf`, advancing it
fn decode_entry<'a>(buf: &mut &'a [u8]) -> Result<(&'a [u8], u64)> {
    if buf.remaining() < 8 {
        return Err(StrataError::Corruption("truncated index entry".to_string()));
    }
    let key_len = buf.get_u64_le();
    if key_len > MAX_FIELD_LEN || buf.remaining() < key_len as usize + 8 {
        return Err(StrataError::Corruption(format!(
            "index entry with key length {} overruns the bracket",
            key_len
        )));
    }
    let slice: &'a [u8] = *buf;
    let (key, rest) = slice.split_at(key_len as usize);
    *buf = rest;
    let offset = buf.get_u64_le();
    Ok((key, offset))
}

/// Scan the index entries lying in `[lower, upper)` for an exact key match.
///
/// `segment_start` is where the index segment begins in its file and
/// `segment_size` its length. A bracket past the segment end, or an inverted
/// one, is rejected with [`StrataError::OutOfRange`].
pub(crate) fn find_in_range<R: Read + Seek>(
    reader: &mut R,
    segment_start: u64,
    segment_size: u64,
    key: &[u8],
    lower: u64,
    upper: u64,
) -> Result<Option<u64>> {
    if lower > upper || upper > segment_size {
        return Err(StrataError::OutOfRange {
            lower,
            upper,
            size: segment_size,
        });
    }

    let mut bracket = vec![0u8; (upper - lower) as usize];
    reader.seek(SeekFrom::Start(segment_start + lower))?;
    reader.read_exact(&mut bracket)?;

    let mut cursor = bracket.as_slice();
    while cursor.has_remaining() {
        let (candidate, offset) = decode_entry(&mut cursor)?;
        match candidate.cmp(key) {
            std::cmp::Ordering::Less => continue,
            std::cmp::Ordering::Equal => return Ok(Some(offset)),
            std::cmp::Ordering::Greater => break,
        }
    }
    Ok(None)
}
