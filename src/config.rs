//! Configuration for StrataKV
//!
//! Centralized configuration with sensible defaults. Every threshold is
//! checked by [`Config::validate`] before the engine touches the disk.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Main configuration for a StrataKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal/             (write-ahead log segments)
    ///     └── data/
    ///         ├── level-001/   (sorted runs, newest generation last)
    ///         └── level-002/
    pub data_dir: PathBuf,

    /// Whether each run is written as separate segment files or one file
    pub run_layout: RunLayout,

    /// Target false-positive probability of each run's membership filter
    pub filter_precision: f64,

    /// Every Nth index key is copied into the summary
    pub summary_step: usize,

    /// Chunk size (bytes) of the integrity tree leaves
    pub integrity_chunk_size: usize,

    // -------------------------------------------------------------------------
    // LSM Shape
    // -------------------------------------------------------------------------
    /// Highest level number; runs at this level are never compacted further
    pub max_levels: usize,

    /// Run count that triggers compaction of a level
    pub level_fan_out: usize,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Segment size (bytes) after which the WAL rotates to a new segment
    pub wal_segment_size: u64,

    /// Low-water mark: segments kept by a retention trim
    pub wal_retained_segments: usize,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max number of distinct keys before flush
    pub memtable_capacity: usize,

    /// Backing ordered structure
    pub memtable_backend: MemTableBackend,

    /// Max tower height of the skip list backend
    pub skiplist_max_height: usize,

    /// Minimum degree of the B-tree backend
    pub btree_degree: usize,

    // -------------------------------------------------------------------------
    // Read Path / Admission
    // -------------------------------------------------------------------------
    /// Entries held by the recency cache
    pub cache_capacity: usize,

    /// Optional fixed-window request limit (disabled by default)
    pub rate_limit: Option<RateLimit>,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Ordered structure backing the memtable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemTableBackend {
    SkipList,
    BTree,
}

impl FromStr for MemTableBackend {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skiplist" | "skip-list" => Ok(MemTableBackend::SkipList),
            "btree" | "b-tree" => Ok(MemTableBackend::BTree),
            other => Err(StrataError::Config(format!(
                "unknown memtable backend '{}' (expected skiplist or btree)",
                other
            ))),
        }
    }
}

impl fmt::Display for MemTableBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemTableBackend::SkipList => write!(f, "skiplist"),
            MemTableBackend::BTree => write!(f, "btree"),
        }
    }
}

/// On-disk arrangement of a run's segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunLayout {
    /// One file per segment kind
    Separate,

    /// Data, index, summary, filter and integrity segments in a single file
    Combined,
}

/// Fixed-window admission limit
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Length of one window
    pub window: Duration,

    /// Requests admitted per window
    pub max_requests: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stratakv_data"),
            run_layout: RunLayout::Separate,
            filter_precision: 0.01,
            summary_step: 16,
            integrity_chunk_size: 1024,
            max_levels: 4,
            level_fan_out: 4,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            wal_segment_size: 1024 * 1024, // 1 MB
            wal_retained_segments: 10,
            memtable_capacity: 1024,
            memtable_backend: MemTableBackend::SkipList,
            skiplist_max_height: 12,
            btree_degree: 4,
            cache_capacity: 64,
            rate_limit: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check every threshold; returns the first violation found
    pub fn validate(&self) -> Result<()> {
        let positive: [(&str, u64); 10] = [
            ("summary_step", self.summary_step as u64),
            ("integrity_chunk_size", self.integrity_chunk_size as u64),
            ("max_levels", self.max_levels as u64),
            ("level_fan_out", self.level_fan_out as u64),
            ("wal_segment_size", self.wal_segment_size),
            ("wal_retained_segments", self.wal_retained_segments as u64),
            ("memtable_capacity", self.memtable_capacity as u64),
            ("skiplist_max_height", self.skiplist_max_height as u64),
            ("btree_degree", self.btree_degree as u64),
            ("cache_capacity", self.cache_capacity as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(StrataError::Config(format!("{} must be > 0", name)));
            }
        }

        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(StrataError::Config(
                "wal_sync_strategy entry count must be > 0".to_string(),
            ));
        }

        if !(self.filter_precision > 0.0 && self.filter_precision < 1.0) {
            return Err(StrataError::Config(format!(
                "filter_precision must be strictly between 0 and 1, got {}",
                self.filter_precision
            )));
        }

        if self.btree_degree < 2 {
            return Err(StrataError::Config(format!(
                "btree_degree must be >= 2, got {}",
                self.btree_degree
            )));
        }

        if let Some(limit) = self.rate_limit {
            if limit.window.is_zero() || limit.max_requests == 0 {
                return Err(StrataError::Config(
                    "rate_limit window and max_requests must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the run layout
    pub fn run_layout(mut self, layout: RunLayout) -> Self {
        self.config.run_layout = layout;
        self
    }

    /// Set the membership filter false-positive target
    pub fn filter_precision(mut self, precision: f64) -> Self {
        self.config.filter_precision = precision;
        self
    }

    /// Set the summary step
    pub fn summary_step(mut self, step: usize) -> Self {
        self.config.summary_step = step;
        self
    }

    /// Set the integrity tree chunk size (in bytes)
    pub fn integrity_chunk_size(mut self, size: usize) -> Self {
        self.config.integrity_chunk_size = size;
        self
    }

    /// Set the maximum level number
    pub fn max_levels(mut self, levels: usize) -> Self {
        self.config.max_levels = levels;
        self
    }

    /// Set the per-level fan-out
    pub fn level_fan_out(mut self, fan_out: usize) -> Self {
        self.config.level_fan_out = fan_out;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the WAL segment size (in bytes)
    pub fn wal_segment_size(mut self, size: u64) -> Self {
        self.config.wal_segment_size = size;
        self
    }

    /// Set how many WAL segments a retention trim keeps
    pub fn wal_retained_segments(mut self, count: usize) -> Self {
        self.config.wal_retained_segments = count;
        self
    }

    /// Set the memtable capacity (distinct keys)
    pub fn memtable_capacity(mut self, capacity: usize) -> Self {
        self.config.memtable_capacity = capacity;
        self
    }

    /// Set the memtable backing structure
    pub fn memtable_backend(mut self, backend: MemTableBackend) -> Self {
        self.config.memtable_backend = backend;
        self
    }

    /// Set the skip list max height
    pub fn skiplist_max_height(mut self, height: usize) -> Self {
        self.config.skiplist_max_height = height;
        self
    }

    /// Set the B-tree minimum degree
    pub fn btree_degree(mut self, degree: usize) -> Self {
        self.config.btree_degree = degree;
        self
    }

    /// Set the recency cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Enable the fixed-window rate limiter
    pub fn rate_limit(mut self, window: Duration, max_requests: u32) -> Self {
        self.config.rate_limit = Some(RateLimit { window, max_requests });
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
