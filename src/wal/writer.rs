//! WAL Writer
//!
//! Handles appending entries to the active WAL segment.
//!
//! Every append reaches the OS immediately; fsync follows the configured
//! [`WalSyncStrategy`]. Once the active segment holds `max_segment_size`
//! bytes, the next append opens a fresh segment with the next index.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::config::WalSyncStrategy;
use crate::error::Result;
use crate::paths::StoragePaths;
use crate::record::Record;

use super::{WalEntry, WalReader};

/// Writes entries to the active WAL segment
pub struct WalWriter {
    paths: StoragePaths,
    writer: BufWriter<File>,
    /// Index of the active segment
    segment_index: u64,
    /// Bytes currently in the active segment
    segment_len: u64,
    max_segment_size: u64,
    sync_strategy: WalSyncStrategy,
    /// Appends since the last fsync
    uncommitted: usize,
    buf: BytesMut,
}

impl WalWriter {
    /// Open the newest segment for appending, creating `wal-000000.log` if
    /// the log is empty
    pub fn open(
        paths: &StoragePaths,
        sync_strategy: WalSyncStrategy,
        max_segment_size: u64,
    ) -> Result<Self> {
        fs::create_dir_all(paths.wal_dir())?;
        let segment_index = paths
            .wal_segments()?
            .last()
            .map(|(index, _)| *index)
            .unwrap_or(0);
        let (writer, segment_len) = Self::open_segment(paths, segment_index)?;

        debug!(segment = segment_index, bytes = segment_len, "opened WAL segment");

        Ok(Self {
            paths: paths.clone(),
            writer,
            segment_index,
            segment_len,
            max_segment_size,
            sync_strategy,
            uncommitted: 0,
            buf: BytesMut::with_capacity(4096),
        })
    }

    fn open_segment(paths: &StoragePaths, index: u64) -> Result<(BufWriter<File>, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(paths.wal_segment(index))?;
        let len = file.metadata()?.len();
        Ok((BufWriter::new(file), len))
    }

    /// Re-read the active segment from disk (after recovery truncated it)
    pub fn reopen(&mut self) -> Result<()> {
        self.writer.flush()?;
        let (writer, len) = Self::open_segment(&self.paths, self.segment_index)?;
        self.writer = writer;
        self.segment_len = len;
        Ok(())
    }

    /// Append a mutation
    pub fn append(&mut self, record: &Record) -> Result<()> {
        self.buf.clear();
        record.encode_into(&mut self.buf);
        self.write_buffered()
    }

    /// Append a flush marker. Always synced: it is the recovery boundary.
    pub fn append_flush_marker(&mut self, timestamp: u64) -> Result<()> {
        self.buf.clear();
        WalEntry::FlushMarker { timestamp }.encode(&mut self.buf);
        self.write_buffered()?;
        self.sync()
    }

    fn write_buffered(&mut self) -> Result<()> {
        if self.segment_len >= self.max_segment_size {
            self.rotate()?;
        }

        if let Err(e) = self.writer.write_all(&self.buf).and_then(|_| self.writer.flush()) {
            self.discard_partial_write();
            return Err(e.into());
        }
        self.segment_len += self.buf.len() as u64;
        self.uncommitted += 1;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } => {
                if self.uncommitted >= count {
                    self.sync()?;
                }
            }
        }
        Ok(())
    }

    /// Cut the active segment back to its last complete frame and drop
    /// whatever is still buffered, so the next append starts clean
    fn discard_partial_write(&mut self) {
        if let Err(e) = self.reset_segment() {
            warn!(segment = self.segment_index, error = %e, "failed to roll back partial WAL write");
        }
    }

    fn reset_segment(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.paths.wal_segment(self.segment_index))?;
        file.set_len(self.segment_len)?;
        file.sync_data()?;

        let (writer, len) = Self::open_segment(&self.paths, self.segment_index)?;
        // into_parts hands back the file without flushing the stale buffer
        let (_, _stale) = std::mem::replace(&mut self.writer, writer).into_parts();
        self.segment_len = len;
        warn!(segment = self.segment_index, bytes = len, "rolled back partial WAL write");
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.sync()?;
        let next = self.segment_index + 1;
        let (writer, len) = Self::open_segment(&self.paths, next)?;
        self.writer = writer;
        self.segment_index = next;
        self.segment_len = len;
        debug!(segment = next, "rotated WAL segment");
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Delete the oldest segments so that `keep` remain, then renumber the
    /// survivors contiguously from zero.
    ///
    /// Segments holding entries logged after the newest flush marker are
    /// never deleted, even if that leaves more than `keep` segments.
    /// Returns the number of segments removed.
    pub fn trim_retained(&mut self, keep: usize) -> Result<usize> {
        self.sync()?;

        let segments = self.paths.wal_segments()?;
        let protected_from = Self::first_unflushed_segment(&segments)?;

        let mut cut = segments.len().saturating_sub(keep.max(1));
        if cut > protected_from {
            warn!(
                requested = keep,
                kept = segments.len() - protected_from,
                "WAL retention clamped to keep unflushed segments"
            );
            cut = protected_from;
        }

        for (_, path) in &segments[..cut] {
            fs::remove_file(path)?;
        }

        // Ascending order: every target name is already free
        for (new_index, (old_index, path)) in segments[cut..].iter().enumerate() {
            let new_index = new_index as u64;
            if new_index != *old_index {
                fs::rename(path, self.paths.wal_segment(new_index))?;
            }
        }

        let remaining = segments.len() - cut;
        self.segment_index = remaining.saturating_sub(1) as u64;
        let (writer, len) = Self::open_segment(&self.paths, self.segment_index)?;
        self.writer = writer;
        self.segment_len = len;

        if cut > 0 {
            info!(removed = cut, remaining, "trimmed WAL segments");
        }
        Ok(cut)
    }

    /// Position (in `segments`) of the first segment recovery still needs
    fn first_unflushed_segment(segments: &[(u64, std::path::PathBuf)]) -> Result<usize> {
        for (position, (_, path)) in segments.iter().enumerate().rev() {
            let entries = WalReader::open(path)?.read_all()?;
            if let Some(marker) = entries.iter().rposition(WalEntry::is_flush_marker) {
                return Ok(if marker + 1 == entries.len() {
                    position + 1
                } else {
                    position
                });
            }
        }
        Ok(0)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Index of the segment currently appended to
    pub fn segment_index(&self) -> u64 {
        self.segment_index
    }

    /// Bytes in the active segment
    pub fn segment_len(&self) -> u64 {
        self.segment_len
    }

    pub fn sync_strategy(&self) -> WalSyncStrategy {
        self.sync_strategy
    }
}
