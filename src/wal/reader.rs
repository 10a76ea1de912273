//! WAL Reader
//!
//! Reads the entries of one WAL segment, oldest first.
//!
//! A damaged frame (cut short by the end of the file, a garbled header or a
//! checksum mismatch) is a *torn tail* when no intact frame starts anywhere
//! after it: the write that was in progress when the process died. The
//! reader stops before it and reports it through [`WalReader::torn_tail`].
//! A damaged frame with an intact frame behind it is corruption and fails
//! with [`StrataError::WalCorruption`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};
use crate::record::{decode_frame, Decoded, Record, FLAG_FLUSH_MARKER, FLAG_TOMBSTONE};

use super::WalEntry;

/// Reads entries from one WAL segment
pub struct WalReader {
    path: PathBuf,
    data: Vec<u8>,
    /// Offset of the next frame; also the length of the valid prefix
    position: usize,
    torn_tail: Option<String>,
    done: bool,
}

impl WalReader {
    /// Open a WAL segment for reading
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            data: fs::read(path)?,
            position: 0,
            torn_tail: None,
            done: false,
        })
    }

    /// Read the next entry from the segment
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        if self.done || self.position == self.data.len() {
            self.done = true;
            return Ok(None);
        }

        match decode_frame(&self.data[self.position..]) {
            Decoded::Incomplete => self.damaged_frame(format!(
                "incomplete frame ({} trailing bytes)",
                self.data.len() - self.position
            )),
            Decoded::Malformed(reason) => self.damaged_frame(reason),
            Decoded::Frame { flags, record, len } => {
                if !record.is_intact() {
                    return self.damaged_frame("checksum mismatch".to_string());
                }
                self.position += len;
                Ok(Some(WalEntry::from_frame(flags, record)))
            }
        }
    }

    /// Torn tail if nothing intact follows the frame at `position`,
    /// corruption otherwise
    fn damaged_frame(&mut self, reason: String) -> Result<Option<WalEntry>> {
        if let Some(next) = self.next_intact_frame(self.position + 1) {
            return Err(StrataError::WalCorruption(format!(
                "{}: {} at offset {} with an intact frame at offset {}",
                self.path.display(),
                reason,
                self.position,
                next
            )));
        }
        self.torn_tail = Some(format!("{} at offset {}", reason, self.position));
        self.done = true;
        Ok(None)
    }

    /// First offset at or after `from` holding a frame that verifies
    fn next_intact_frame(&self, from: usize) -> Option<usize> {
        (from..self.data.len()).find(|&offset| match decode_frame(&self.data[offset..]) {
            Decoded::Frame { flags, record, .. } => is_plausible(flags, &record),
            _ => false,
        })
    }

    /// Read every remaining entry
    pub fn read_all(&mut self) -> Result<Vec<WalEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator { reader: self }
    }

    /// Description of the skipped trailing frame, once the reader reached it
    pub fn torn_tail(&self) -> Option<&str> {
        self.torn_tail.as_deref()
    }

    /// Bytes of intact frames read so far
    pub fn valid_len(&self) -> u64 {
        self.position as u64
    }

    pub fn file_len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_entry().transpose()
    }
}

/// A checksummed frame the writer could have produced. Zeroed or random
/// bytes can pass the checksum of an empty payload, so flags and timestamp
/// are checked too.
fn is_plausible(flags: u8, record: &Record) -> bool {
    if !record.is_intact() || record.timestamp == 0 {
        return false;
    }
    match flags {
        0 | FLAG_TOMBSTONE => true,
        FLAG_FLUSH_MARKER => record.key.is_empty() && record.value_bytes().is_empty(),
        _ => false,
    }
}
