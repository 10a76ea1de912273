//! Run Reader
//!
//! Opens a run from its descriptor and answers point lookups.
//!
//! The filter and the summary are loaded into memory when the run is opened.
//! The index is scanned on disk, bounded by the summary bracket, and the data
//! record is read with a single seek.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, StrataError};
use crate::filter::MembershipFilter;
use crate::paths::{SegmentKind, StoragePaths};
use crate::record::{read_frame, Lookup, Record};
use crate::storage::integrity::{IntegrityTree, IntegrityTreeBuilder};

use super::descriptor::{RunDescriptor, SegmentLocation};
use super::index;
use super::iterator::RunIterator;
use super::summary::Summary;

/// An immutable sorted run, open for reads
pub struct Run {
    descriptor: RunDescriptor,
    level_dir: PathBuf,
    descriptor_path: PathBuf,
    filter: MembershipFilter,
    summary: Summary,
    /// Handle on the index segment's file
    index_file: Mutex<BufReader<File>>,
    /// Handle on the data segment's file
    data_file: Mutex<BufReader<File>>,
    /// Set once compaction replaced this run; files go when the last handle drops
    obsolete: AtomicBool,
}

impl Run {
    /// Open the run `generation` of `level` through its descriptor
    pub fn open(paths: &StoragePaths, level: usize, generation: u64) -> Result<Self> {
        let level_dir = paths.level_dir(level);
        let descriptor_path = paths.run_file(level, generation, SegmentKind::Descriptor);
        let descriptor = RunDescriptor::load(&descriptor_path)?;

        if descriptor.level != level || descriptor.generation != generation {
            return Err(StrataError::Corruption(format!(
                "{} describes run {}/{}",
                descriptor_path.display(),
                descriptor.level,
                descriptor.generation
            )));
        }

        let summary = Summary::decode(&read_segment(&level_dir, &descriptor.summary)?)?;
        let filter = MembershipFilter::deserialize(&read_segment(&level_dir, &descriptor.filter)?)?;
        let index_file = open_segment_file(&level_dir, &descriptor.index)?;
        let data_file = open_segment_file(&level_dir, &descriptor.data)?;

        Ok(Self {
            descriptor,
            level_dir,
            descriptor_path,
            filter,
            summary,
            index_file: Mutex::new(BufReader::new(index_file)),
            data_file: Mutex::new(BufReader::new(data_file)),
            obsolete: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Point Lookup
    // =========================================================================

    /// Latest record for `key` in this run, tombstones included
    ///
    /// filter → summary bracket → bounded index scan → one data read
    pub fn point_lookup(&self, key: &[u8]) -> Result<Option<Record>> {
        if !self.filter.has(key) {
            return Ok(None);
        }
        let (lower, upper) = match self.summary.bracket(key) {
            Some(bracket) => bracket,
            None => return Ok(None),
        };

        let offset = {
            let mut index_file = self.index_file.lock();
            let location = &self.descriptor.index;
            index::find_in_range(
                &mut *index_file,
                location.offset,
                location.size,
                key,
                lower,
                upper,
            )?
        };
        let offset = match offset {
            Some(offset) => offset,
            None => return Ok(None),
        };

        self.read_record_at(offset).and_then(|record| {
            if record.key == key {
                Ok(Some(record))
            } else {
                Err(StrataError::Corruption(format!(
                    "run {}/{}: index points at {:?} for key {:?}",
                    self.level(),
                    self.generation(),
                    String::from_utf8_lossy(&record.key),
                    String::from_utf8_lossy(key)
                )))
            }
        })
    }

    /// Found, deleted, or not in this run
    pub fn get(&self, key: &[u8]) -> Result<Lookup> {
        Ok(match self.point_lookup(key)? {
            Some(record) => record.lookup(),
            None => Lookup::NotFound,
        })
    }

    fn read_record_at(&self, offset: u64) -> Result<Record> {
        let location = &self.descriptor.data;
        if offset >= location.size {
            return Err(StrataError::OutOfRange {
                lower: offset,
                upper: offset,
                size: location.size,
            });
        }
        let mut data_file = self.data_file.lock();
        data_file.seek(SeekFrom::Start(location.offset + offset))?;
        let mut bounded = (&mut *data_file).take(location.size - offset);
        match read_frame(&mut bounded)? {
            Some((record, _)) => Ok(record),
            None => Err(StrataError::Corruption(format!(
                "run {}/{}: no record at data offset {}",
                self.level(),
                self.generation(),
                offset
            ))),
        }
    }

    // =========================================================================
    // Iteration & Verification
    // =========================================================================

    /// Every record in ascending key order
    pub fn iter(&self) -> Result<RunIterator> {
        let location = &self.descriptor.data;
        RunIterator::new(
            &self.level_dir.join(&location.file),
            location.offset,
            location.size,
        )
    }

    /// Re-derive the integrity tree from the data segment and compare it with
    /// the stored one. Returns the indices of chunks that no longer match.
    pub fn verify_integrity(&self) -> Result<Vec<usize>> {
        let stored = IntegrityTree::deserialize(&read_segment(
            &self.level_dir,
            &self.descriptor.integrity,
        )?)?;

        let location = &self.descriptor.data;
        let mut file = File::open(self.level_dir.join(&location.file))?;
        file.seek(SeekFrom::Start(location.offset))?;
        let mut data = BufReader::new(file).take(location.size);

        let mut builder = IntegrityTreeBuilder::new(self.descriptor.integrity_chunk_size as usize);
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let read = data.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            builder.update(&chunk[..read]);
        }

        let damaged = stored.differing_chunks(&builder.finish());
        if !damaged.is_empty() {
            warn!(
                level = self.level(),
                generation = self.generation(),
                chunks = ?damaged,
                "integrity check failed"
            );
        }
        Ok(damaged)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Schedule the run's files for deletion once the last reference drops
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }

    /// Every file of the run, descriptor last
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .descriptor
            .files()
            .into_iter()
            .map(|f| self.level_dir.join(f))
            .collect();
        files.push(self.descriptor_path.clone());
        files
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn level(&self) -> usize {
        self.descriptor.level
    }

    pub fn generation(&self) -> u64 {
        self.descriptor.generation
    }

    pub fn entry_count(&self) -> u64 {
        self.descriptor.entry_count
    }

    pub fn max_timestamp(&self) -> u64 {
        self.descriptor.max_timestamp
    }

    pub fn first_key(&self) -> &[u8] {
        self.summary.first_key()
    }

    pub fn last_key(&self) -> &[u8] {
        self.summary.last_key()
    }

    pub fn descriptor(&self) -> &RunDescriptor {
        &self.descriptor
    }

    pub fn filter(&self) -> &MembershipFilter {
        &self.filter
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("level", &self.level())
            .field("generation", &self.generation())
            .field("entries", &self.entry_count())
            .field("obsolete", &self.is_obsolete())
            .finish()
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        if !self.is_obsolete() {
            return;
        }
        // Descriptor first: a crash midway leaves orphans, never a dangling run
        let mut files = self.files();
        files.rotate_right(1);
        for file in files {
            if let Err(e) = fs::remove_file(&file) {
                warn!(file = %file.display(), error = %e, "failed to delete obsolete run file");
            }
        }
        debug!(
            level = self.level(),
            generation = self.generation(),
            "deleted obsolete run"
        );
    }
}

fn open_segment_file(level_dir: &Path, location: &SegmentLocation) -> Result<File> {
    let file = File::open(level_dir.join(&location.file))?;
    let len = file.metadata()?.len();
    if location.offset + location.size > len {
        return Err(StrataError::Corruption(format!(
            "{}: segment [{}, {}) exceeds file length {}",
            location.file,
            location.offset,
            location.offset + location.size,
            len
        )));
    }
    Ok(file)
}

fn read_segment(level_dir: &Path, location: &SegmentLocation) -> Result<Vec<u8>> {
    let mut file = open_segment_file(level_dir, location)?;
    file.seek(SeekFrom::Start(location.offset))?;
    let mut bytes = vec![0u8; location.size as usize];
    file.read_exact(&mut bytes)?;
    Ok(bytes)
}
