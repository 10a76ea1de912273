//! Storage paths
//!
//! Every directory and file name the engine touches is derived here, from one
//! root passed in explicitly. Components receive a [`StoragePaths`] at
//! construction instead of joining paths ad hoc.
//!
//! ```text
//! {root}/
//!   ├── wal/
//!   │     ├── wal-000000.log
//!   │     └── wal-000001.log
//!   └── data/
//!         ├── level-001/
//!         │     ├── 000001-data.db
//!         │     ├── 000001-index.db
//!         │     ├── 000001-summary.db
//!         │     ├── 000001-filter.db
//!         │     ├── 000001-integrity.db
//!         │     └── 000001-descriptor.json
//!         └── level-002/
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

const WAL_DIR: &str = "wal";
const DATA_DIR: &str = "data";
const WAL_PREFIX: &str = "wal-";
const WAL_SUFFIX: &str = ".log";
const LEVEL_PREFIX: &str = "level-";

/// Suffix of a descriptor that has not been renamed into place yet
pub const TEMP_SUFFIX: &str = ".tmp";

/// The artifacts a sorted run is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Data,
    Index,
    Summary,
    Filter,
    Integrity,
    /// All segments in one file (combined layout)
    Combined,
    Descriptor,
}

impl SegmentKind {
    fn file_suffix(self) -> &'static str {
        match self {
            SegmentKind::Data => "data.db",
            SegmentKind::Index => "index.db",
            SegmentKind::Summary => "summary.db",
            SegmentKind::Filter => "filter.db",
            SegmentKind::Integrity => "integrity.db",
            SegmentKind::Combined => "run.db",
            SegmentKind::Descriptor => "descriptor.json",
        }
    }
}

/// Root-relative layout of a StrataKV data directory
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root, WAL and data directories
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.wal_dir())?;
        fs::create_dir_all(self.data_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn wal_dir(&self) -> PathBuf {
        self.root.join(WAL_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    // =========================================================================
    // WAL Segments
    // =========================================================================

    /// "wal-000042.log"
    pub fn wal_segment(&self, index: u64) -> PathBuf {
        self.wal_dir()
            .join(format!("{}{:06}{}", WAL_PREFIX, index, WAL_SUFFIX))
    }

    /// Parse the segment index from a WAL file name
    pub fn parse_wal_segment(path: &Path) -> Option<u64> {
        let name = path.file_name()?.to_str()?;
        name.strip_prefix(WAL_PREFIX)?
            .strip_suffix(WAL_SUFFIX)?
            .parse()
            .ok()
    }

    /// All WAL segments on disk, ordered oldest → newest
    pub fn wal_segments(&self) -> Result<Vec<(u64, PathBuf)>> {
        let mut segments = Vec::new();
        let dir = self.wal_dir();
        if !dir.exists() {
            return Ok(segments);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if let Some(index) = Self::parse_wal_segment(&path) {
                segments.push((index, path));
            }
        }
        segments.sort_by_key(|(index, _)| *index);
        Ok(segments)
    }

    // =========================================================================
    // Levels and Runs
    // =========================================================================

    /// "level-003"
    pub fn level_dir(&self, level: usize) -> PathBuf {
        self.data_dir().join(format!("{}{:03}", LEVEL_PREFIX, level))
    }

    /// Parse the level number from a level directory name
    pub fn parse_level_dir(path: &Path) -> Option<usize> {
        let name = path.file_name()?.to_str()?;
        name.strip_prefix(LEVEL_PREFIX)?.parse().ok()
    }

    /// File name (relative to the level directory) of one run artifact
    pub fn run_file_name(generation: u64, kind: SegmentKind) -> String {
        format!("{:06}-{}", generation, kind.file_suffix())
    }

    /// Full path of one run artifact
    pub fn run_file(&self, level: usize, generation: u64, kind: SegmentKind) -> PathBuf {
        self.level_dir(level)
            .join(Self::run_file_name(generation, kind))
    }

    /// Generation number encoded in a run file name, if any
    pub fn parse_run_generation(path: &Path) -> Option<u64> {
        let name = path.file_name()?.to_str()?;
        let (generation, _) = name.split_once('-')?;
        generation.parse().ok()
    }

    /// Whether a file name is a committed descriptor
    pub fn is_descriptor(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(SegmentKind::Descriptor.file_suffix()))
            .unwrap_or(false)
    }
}
