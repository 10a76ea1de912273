//! Run Builder
//!
//! Writes sorted records to a new run.
//!
//! The data segment is written sequentially while the filter, the integrity
//! hashes and the (key, offset) index are fed along the way. `finish()` then
//! emits the index, summary, filter and integrity segments, and finally the
//! descriptor, which makes the run visible.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use bytes::BytesMut;
use tracing::debug;

use crate::config::{Config, RunLayout};
use crate::error::{Result, StrataError};
use crate::filter::MembershipFilter;
use crate::paths::{SegmentKind, StoragePaths};
use crate::record::Record;
use crate::storage::integrity::IntegrityTreeBuilder;

use super::descriptor::{RunDescriptor, SegmentLocation, FORMAT_VERSION};
use super::index;
use super::summary::Summary;
use super::Run;

/// Per-run construction parameters
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub layout: RunLayout,
    pub filter_precision: f64,
    pub summary_step: usize,
    pub integrity_chunk_size: usize,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: config.run_layout,
            filter_precision: config.filter_precision,
            summary_step: config.summary_step,
            integrity_chunk_size: config.integrity_chunk_size,
        }
    }
}

/// Builder for creating a new run from sorted records
pub struct RunBuilder {
    paths: StoragePaths,
    level: usize,
    generation: u64,
    options: RunOptions,
    /// File the data segment goes to (the only file in combined layout)
    data_file: String,
    writer: BufWriter<File>,
    /// Bytes written to the data segment
    data_len: u64,
    /// key → offset of its record in the data segment
    index: Vec<(Vec<u8>, u64)>,
    filter: MembershipFilter,
    integrity: IntegrityTreeBuilder,
    max_timestamp: u64,
    buf: BytesMut,
}

impl RunBuilder {
    /// Start a run at `level` with `generation`, sized for `expected_items`
    pub fn new(
        paths: &StoragePaths,
        level: usize,
        generation: u64,
        expected_items: usize,
        options: RunOptions,
    ) -> Result<Self> {
        std::fs::create_dir_all(paths.level_dir(level))?;

        let kind = match options.layout {
            RunLayout::Separate => SegmentKind::Data,
            RunLayout::Combined => SegmentKind::Combined,
        };
        let data_file = StoragePaths::run_file_name(generation, kind);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(paths.level_dir(level).join(&data_file))?;

        Ok(Self {
            paths: paths.clone(),
            level,
            generation,
            options,
            data_file,
            writer: BufWriter::new(file),
            data_len: 0,
            index: Vec::with_capacity(expected_items),
            filter: MembershipFilter::new(expected_items, options.filter_precision)?,
            integrity: IntegrityTreeBuilder::new(options.integrity_chunk_size),
            max_timestamp: 0,
            buf: BytesMut::with_capacity(4096),
        })
    }

    /// Build a complete run from records already in ascending key order
    pub fn build(
        paths: &StoragePaths,
        level: usize,
        generation: u64,
        records: &[Record],
        options: RunOptions,
    ) -> Result<Run> {
        let mut builder = Self::new(paths, level, generation, records.len(), options)?;
        for record in records {
            builder.add(record)?;
        }
        builder.finish()
    }

    /// Append a record (keys must be strictly increasing)
    pub fn add(&mut self, record: &Record) -> Result<()> {
        if let Some((last, _)) = self.index.last() {
            if record.key.as_slice() <= last.as_slice() {
                return Err(StrataError::Storage(format!(
                    "run keys must be strictly increasing: {:?} after {:?}",
                    String::from_utf8_lossy(&record.key),
                    String::from_utf8_lossy(last)
                )));
            }
        }

        self.buf.clear();
        record.encode_into(&mut self.buf);
        self.writer.write_all(&self.buf)?;
        self.integrity.update(&self.buf);
        self.filter.add(&record.key);
        self.index.push((record.key.clone(), self.data_len));

        self.data_len += self.buf.len() as u64;
        self.max_timestamp = self.max_timestamp.max(record.timestamp);
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Write the remaining segments and the descriptor, then open the run
    pub fn finish(mut self) -> Result<Run> {
        if self.index.is_empty() {
            return Err(StrataError::Storage("refusing to build an empty run".to_string()));
        }

        // Index segment, remembering where each entry starts for the summary
        let mut index_bytes = BytesMut::new();
        let mut index_offsets = Vec::with_capacity(self.index.len());
        for (key, data_offset) in &self.index {
            index_offsets.push((key.clone(), index_bytes.len() as u64));
            index::encode_entry(&mut index_bytes, key, *data_offset);
        }

        let summary = Summary::build(&index_offsets, self.options.summary_step)?;
        let summary_bytes = summary.encode();
        let filter_bytes = self.filter.serialize()?;
        let entry_count = self.index.len() as u64;
        let integrity_bytes = std::mem::replace(
            &mut self.integrity,
            IntegrityTreeBuilder::new(self.options.integrity_chunk_size),
        )
        .finish()
        .serialize()?;

        let data = SegmentLocation {
            file: self.data_file.clone(),
            offset: 0,
            size: self.data_len,
        };
        let (index, summary, filter, integrity) = match self.options.layout {
            RunLayout::Separate => {
                self.writer.flush()?;
                self.writer.get_ref().sync_all()?;
                (
                    self.write_separate(SegmentKind::Index, &index_bytes)?,
                    self.write_separate(SegmentKind::Summary, &summary_bytes)?,
                    self.write_separate(SegmentKind::Filter, &filter_bytes)?,
                    self.write_separate(SegmentKind::Integrity, &integrity_bytes)?,
                )
            }
            RunLayout::Combined => {
                let index = self.append_combined(&index_bytes)?;
                let summary = self.append_combined(&summary_bytes)?;
                let filter = self.append_combined(&filter_bytes)?;
                let integrity = self.append_combined(&integrity_bytes)?;
                self.writer.flush()?;
                self.writer.get_ref().sync_all()?;
                (index, summary, filter, integrity)
            }
        };

        let descriptor = RunDescriptor {
            format_version: FORMAT_VERSION,
            level: self.level,
            generation: self.generation,
            layout: self.options.layout,
            entry_count,
            max_timestamp: self.max_timestamp,
            integrity_chunk_size: self.options.integrity_chunk_size as u64,
            data,
            index,
            summary,
            filter,
            integrity,
        };
        descriptor.write(&self.descriptor_path())?;

        debug!(
            level = self.level,
            generation = self.generation,
            entries = entry_count,
            bytes = self.data_len,
            "wrote run"
        );

        Run::open(&self.paths, self.level, self.generation)
    }

    fn descriptor_path(&self) -> PathBuf {
        self.paths
            .run_file(self.level, self.generation, SegmentKind::Descriptor)
    }

    fn write_separate(&self, kind: SegmentKind, bytes: &[u8]) -> Result<SegmentLocation> {
        let file = StoragePaths::run_file_name(self.generation, kind);
        let mut out = File::create(self.paths.level_dir(self.level).join(&file))?;
        out.write_all(bytes)?;
        out.sync_all()?;
        Ok(SegmentLocation {
            file,
            offset: 0,
            size: bytes.len() as u64,
        })
    }

    /// Offsets are absolute within the combined file
    fn append_combined(&mut self, bytes: &[u8]) -> Result<SegmentLocation> {
        let offset = self.data_len;
        self.writer.write_all(bytes)?;
        self.data_len += bytes.len() as u64;
        Ok(SegmentLocation {
            file: self.data_file.clone(),
            offset,
            size: bytes.len() as u64,
        })
    }
}
