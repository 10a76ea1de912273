//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.
//!
//! Segments are scanned newest → oldest and, within a segment, last entry →
//! first, until a flush marker is met (the marker itself is not replayed).
//! The collected mutations are returned in their original order.
//!
//! Only the newest segment may end in a torn frame; recovery skips it and
//! truncates the segment back to its last intact frame. Damage anywhere else
//! aborts recovery with [`StrataError::WalCorruption`].

use std::fs::OpenOptions;

use tracing::{info, warn};

use crate::error::{Result, StrataError};
use crate::paths::StoragePaths;
use crate::record::Record;

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone)]
pub struct RecoveryResult {
    /// Mutations logged after the newest flush marker
    pub entries_recovered: u64,

    /// Segments read before the boundary was found
    pub segments_scanned: usize,

    /// Whether a flush marker bounded the scan
    pub found_flush_marker: bool,

    /// Highest timestamp among the scanned entries (0 if none)
    pub last_timestamp: u64,

    /// Whether a torn trailing frame was found in the newest segment
    pub was_truncated: bool,

    /// Size of that torn frame
    pub bytes_truncated: u64,
}

impl WalRecovery {
    /// Collect every mutation after the newest flush marker, oldest first,
    /// and truncate a torn tail off the newest segment.
    pub fn recover_unflushed(paths: &StoragePaths) -> Result<(Vec<Record>, RecoveryResult)> {
        let (records, result) = Self::scan(paths, true)?;
        info!(
            recovered = result.entries_recovered,
            segments = result.segments_scanned,
            marker = result.found_flush_marker,
            truncated = result.was_truncated,
            "WAL recovery complete"
        );
        Ok((records, result))
    }

    /// Same scan as recovery without modifying any file
    pub fn verify(paths: &StoragePaths) -> Result<RecoveryResult> {
        Self::scan(paths, false).map(|(_, result)| result)
    }

    fn scan(paths: &StoragePaths, repair: bool) -> Result<(Vec<Record>, RecoveryResult)> {
        let segments = paths.wal_segments()?;
        let mut result = RecoveryResult::default();
        let mut newest_first = Vec::new();

        'segments: for (position, (_, path)) in segments.iter().enumerate().rev() {
            result.segments_scanned += 1;

            let mut reader = WalReader::open(path)?;
            let entries = reader.read_all()?;

            if let Some(tail) = reader.torn_tail() {
                if position + 1 != segments.len() {
                    return Err(StrataError::WalCorruption(format!(
                        "{}: {} in a sealed segment",
                        path.display(),
                        tail
                    )));
                }
                warn!(segment = %path.display(), "skipping torn WAL tail: {}", tail);
                result.was_truncated = true;
                result.bytes_truncated = reader.file_len() - reader.valid_len();
                if repair {
                    let file = OpenOptions::new().write(true).open(path)?;
                    file.set_len(reader.valid_len())?;
                    file.sync_all()?;
                }
            }

            for entry in entries.into_iter().rev() {
                result.last_timestamp = result.last_timestamp.max(entry.timestamp());
                match entry {
                    WalEntry::FlushMarker { .. } => {
                        result.found_flush_marker = true;
                        break 'segments;
                    }
                    WalEntry::Mutation(record) => newest_first.push(record),
                }
            }
        }

        newest_first.reverse();
        result.entries_recovered = newest_first.len() as u64;
        Ok((newest_first, result))
    }
}
