//! Run descriptor
//!
//! The JSON document that ties a run's segments together. It is written
//! last, through a temporary file and a rename, so a run is visible only
//! once every segment it points at is on disk.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::RunLayout;
use crate::error::{Result, StrataError};
use crate::paths::TEMP_SUFFIX;

/// Format version written into every descriptor
pub const FORMAT_VERSION: u32 = 1;

/// Where one segment lives, relative to the level directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentLocation {
    pub file: String,
    pub offset: u64,
    pub size: u64,
}

/// Self-describing record of a run's segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub format_version: u32,
    pub level: usize,
    pub generation: u64,
    pub layout: RunLayout,
    pub entry_count: u64,
    /// Newest record timestamp in the run
    pub max_timestamp: u64,
    pub integrity_chunk_size: u64,
    pub data: SegmentLocation,
    pub index: SegmentLocation,
    pub summary: SegmentLocation,
    pub filter: SegmentLocation,
    pub integrity: SegmentLocation,
}

impl RunDescriptor {
    /// Write to `path` atomically: temp file, fsync, rename
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(TEMP_SUFFIX);
        let temp = Path::new(&temp_name);

        let mut file = File::create(temp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);

        fs::rename(temp, path)?;
        if let Some(dir) = path.parent() {
            // Persist the rename itself
            File::open(dir)?.sync_all()?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let descriptor: Self = serde_json::from_slice(&fs::read(path)?)?;
        if descriptor.format_version != FORMAT_VERSION {
            return Err(StrataError::Corruption(format!(
                "{}: unsupported run format version {}",
                path.display(),
                descriptor.format_version
            )));
        }
        Ok(descriptor)
    }

    /// Every distinct file the run occupies, descriptor excluded
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::with_capacity(5);
        for location in [&self.data, &self.index, &self.summary, &self.filter, &self.integrity] {
            if !files.contains(&location.file.as_str()) {
                files.push(&location.file);
            }
        }
        files
    }
}
