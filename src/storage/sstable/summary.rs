//! Summary segment
//!
//! A sparse index over the index segment: every `step`-th index key (starting
//! with the first) and the last key, each with the byte offset of its entry
//! in the index segment.
//!
//! ```text
//! [FirstLen: u64][FirstKey][LastLen: u64][LastKey]
//! [KeyLen: u64][Key][IndexOffset: u64]   ... repeated, last key included
//! ```

use bytes::{Buf, BufMut, BytesMut};

use super::index;
use crate::error::{Result, StrataError};
use crate::record::MAX_FIELD_LEN;

/// In-memory summary of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    first_key: Vec<u8>,
    last_key: Vec<u8>,
    keys: Vec<Vec<u8>>,
    /// Start of each sampled key's entry in the index segment
    offsets: Vec<u64>,
}

impl Summary {
    /// Sample `index` (key, index-segment offset) pairs every `step` entries.
    /// `index` must be non-empty and sorted.
    pub fn build(index: &[(Vec<u8>, u64)], step: usize) -> Result<Self> {
        let (first, last) = match (index.first(), index.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(StrataError::Storage(
                    "cannot summarize an empty index".to_string(),
                ))
            }
        };

        let step = step.max(1);
        let mut keys = Vec::with_capacity(index.len() / step + 2);
        let mut offsets = Vec::with_capacity(keys.capacity());
        for (key, offset) in index.iter().step_by(step) {
            keys.push(key.clone());
            offsets.push(*offset);
        }
        if keys.last() != Some(&last.0) {
            keys.push(last.0.clone());
            offsets.push(last.1);
        }

        Ok(Self {
            first_key: first.0.clone(),
            last_key: last.0.clone(),
            keys,
            offsets,
        })
    }

    pub fn first_key(&self) -> &[u8] {
        &self.first_key
    }

    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The `[lower, upper)` byte range of the index segment that must hold
    /// `key` if the run contains it, or `None` when `key` lies outside
    /// `[first_key, last_key]`.
    pub fn bracket(&self, key: &[u8]) -> Option<(u64, u64)> {
        if key < self.first_key.as_slice() || key > self.last_key.as_slice() {
            return None;
        }
        // keys[0] == first_key <= key, so the partition point is >= 1
        let i = self.keys.partition_point(|k| k.as_slice() <= key) - 1;
        let lower = self.offsets[i];
        let upper = if self.keys[i] == key || i + 1 == self.keys.len() {
            lower + index::entry_len(&self.keys[i])
        } else {
            self.offsets[i + 1] + index::entry_len(&self.keys[i + 1])
        };
        Some((lower, upper))
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        for key in [&self.first_key, &self.last_key] {
            buf.put_u64_le(key.len() as u64);
            buf.put_slice(key);
        }
        for (key, offset) in self.keys.iter().zip(&self.offsets) {
            index::encode_entry(&mut buf, key, *offset);
        }
        buf
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        let first_key = read_key(&mut bytes)?;
        let last_key = read_key(&mut bytes)?;

        let mut keys = Vec::new();
        let mut offsets = Vec::new();
        while bytes.has_remaining() {
            keys.push(read_key(&mut bytes)?);
            if bytes.remaining() < 8 {
                return Err(StrataError::Corruption("truncated summary entry".to_string()));
            }
            offsets.push(bytes.get_u64_le());
        }

        if keys.first() != Some(&first_key) || keys.last() != Some(&last_key) {
            return Err(StrataError::Corruption(
                "summary entries do not span its first and last key".to_string(),
            ));
        }
        Ok(Self {
            first_key,
            last_key,
            keys,
            offsets,
        })
    }
}

fn read_key(bytes: &mut &[u8]) -> Result<Vec<u8>> {
    if bytes.remaining() < 8 {
        return Err(StrataError::Corruption("truncated summary key".to_string()));
    }
    let len = bytes.get_u64_le();
    if len > MAX_FIELD_LEN || bytes.remaining() < len as usize {
        return Err(StrataError::Corruption(format!(
            "summary key length {} overruns the segment",
            len
        )));
    }
    let key = bytes[..len as usize].to_vec();
    bytes.advance(len as usize);
    Ok(key)
}
