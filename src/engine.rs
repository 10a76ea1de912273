//! Engine Module
//!
//! The LSM tree facade that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, recency cache and the disk levels
//! - Handle concurrent read/write access
//! - Flush when the MemTable fills up, compact when a level overflows
//! - Replay unflushed WAL entries on startup

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheStats, RecencyCache};
use crate::config::Config;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::memtable::MemTable;
use crate::paths::StoragePaths;
use crate::record::{now_nanos, Lookup, Record};
use crate::storage::{LevelManager, LevelStats, Run};
use crate::wal::{RecoveryResult, WalRecovery, WalWriter};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/flush/compact/cleanup): Serialized by `write_lock`
///   - Only ONE write operation at a time
///   - Lock order: write_lock → WAL → memtable → levels
///
/// - **Reads** (get): No write_lock needed
///   - MemTable uses internal RwLock (many concurrent readers)
///   - Runs are immutable; the level manager hands out `Arc<Run>` snapshots,
///     so a compaction never deletes files under an in-flight read
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Every directory and file name under `config.data_dir`
    paths: StoragePaths,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Sorted runs grouped by level (internal RwLock on run lists)
    levels: LevelManager,

    /// LRU of values confirmed on disk
    cache: RecencyCache,

    /// Optional admission control for get/put/delete
    limiter: Option<RateLimiter>,

    /// Serializes write operations
    write_lock: Mutex<()>,

    /// Last timestamp handed out; timestamps are strictly increasing
    clock: AtomicU64,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Create the WAL and data directories
    /// 3. Link existing runs, delete orphaned run files
    /// 4. Open the newest WAL segment for appending
    ///
    /// Call [`recover`](Self::recover) next, before any other operation.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let paths = StoragePaths::new(&config.data_dir);
        paths.create_dirs()?;

        let levels = LevelManager::open(&paths, &config)?;
        let memtable = MemTable::new(&config);
        let wal = WalWriter::open(&paths, config.wal_sync_strategy, config.wal_segment_size)?;
        let clock = AtomicU64::new(levels.max_timestamp());

        info!(
            data_dir = %config.data_dir.display(),
            backend = %config.memtable_backend,
            runs = levels.total_runs(),
            "opened engine"
        );

        Ok(Self {
            cache: RecencyCache::new(config.cache_capacity),
            limiter: config.rate_limit.map(RateLimiter::new),
            config,
            paths,
            wal: Mutex::new(wal),
            memtable,
            levels,
            write_lock: Mutex::new(()),
            clock,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Replay WAL entries logged after the last flush marker
    ///
    /// Replayed records keep their original timestamps and are not logged
    /// again. If replay fills the memtable, the rest is flushed as well and a
    /// single flush marker is appended at the end.
    pub fn recover(&self) -> Result<RecoveryResult> {
        let _write_guard = self.write_lock.lock();
        let mut wal = self.wal.lock();

        let (records, result) = WalRecovery::recover_unflushed(&self.paths)?;
        wal.reopen()?;
        self.clock.fetch_max(result.last_timestamp, Ordering::SeqCst);

        let mut flushed_during_replay = false;
        for record in records {
            self.memtable.insert(record)?;
            if self.memtable.is_full() {
                self.write_memtable_run()?;
                flushed_during_replay = true;
            }
        }

        if flushed_during_replay {
            if !self.memtable.is_empty() {
                self.write_memtable_run()?;
            }
            wal.append_flush_marker(self.next_timestamp())?;
            self.cache.clear();
            self.levels.compact_if_needed(1)?;
        }

        info!(
            replayed = result.entries_recovered,
            memtable = self.memtable.len(),
            flushed = flushed_during_replay,
            "recovery finished"
        );
        Ok(result)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes, tombstones included)
    /// 2. Recency cache
    /// 3. Levels (level 1 first, newest run first)
    pub fn get(&self, key: &[u8]) -> Result<Lookup> {
        self.admit()?;
        let epoch = self.cache.epoch();

        if let Some(record) = self.memtable.get(key) {
            return Ok(record.lookup());
        }

        if let Some(value) = self.cache.get(key) {
            return Ok(Lookup::Found(value));
        }

        match self.levels.get(key)? {
            Some(record) => {
                if let (false, Some(value)) = (record.tombstone, &record.value) {
                    self.cache.put_if_current(key.to_vec(), value.clone(), epoch);
                }
                Ok(record.lookup())
            }
            None => Ok(Lookup::NotFound),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Put a key-value pair. Returns `true` if the write triggered a flush.
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write to WAL (durability)
    /// 3. Write to MemTable
    /// 4. Flush if the MemTable is now full
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.admit()?;
        let _write_guard = self.write_lock.lock();
        let record = Record::put(key, value, self.next_timestamp());
        self.apply(record)
    }

    /// Delete a key by writing a tombstone. Returns `true` if the write
    /// triggered a flush.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.admit()?;
        let _write_guard = self.write_lock.lock();
        let record = Record::tombstone(key, self.next_timestamp());
        self.apply(record)
    }

    /// Log and apply one mutation (called with write lock held)
    fn apply(&self, record: Record) -> Result<bool> {
        // A table left full by a failed flush gets another flush attempt
        // before a new key is admitted
        if self.memtable.is_full() && self.memtable.get(&record.key).is_none() {
            self.flush_internal()?;
        }

        self.wal.lock().append(&record)?;
        self.memtable.insert(record)?;

        if self.memtable.is_full() {
            self.flush_internal()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size. Returns `false` if the
    /// memtable was empty.
    pub fn flush(&self) -> Result<bool> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Internal flush implementation (called with write lock held)
    ///
    /// run at level 1 → flush marker → clear memtable and cache → compaction
    fn flush_internal(&self) -> Result<bool> {
        if self.memtable.is_empty() {
            return Ok(false);
        }

        self.write_memtable_run()?;
        self.wal.lock().append_flush_marker(self.next_timestamp())?;
        self.cache.clear();
        self.levels.compact_if_needed(1)?;
        Ok(true)
    }

    /// Write the memtable as a level-1 run and clear it (no WAL marker)
    fn write_memtable_run(&self) -> Result<Arc<Run>> {
        let records = self.memtable.drain_sorted();
        let run = self.levels.flush(&records)?;
        self.memtable.clear();
        debug!(generation = run.generation(), entries = records.len(), "memtable flushed");
        Ok(run)
    }

    /// Compact level `level` into `level + 1`, cascading if needed
    ///
    /// Fails if the level is empty, deeper than the deepest level in use, or
    /// the last configured level.
    pub fn compact_level(&self, level: usize) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.levels.compact(level)?;
        Ok(())
    }

    /// Trim the WAL down to the configured number of retained segments.
    /// Returns how many segments were deleted.
    pub fn cleanup_log(&self) -> Result<usize> {
        let _write_guard = self.write_lock.lock();
        self.wal
            .lock()
            .trim_retained(self.config.wal_retained_segments)
    }

    /// Check every run's data against its integrity tree.
    /// Returns (level, generation, damaged chunks) for each failing run.
    pub fn verify_integrity(&self) -> Result<Vec<(usize, u64, Vec<usize>)>> {
        self.levels.verify_integrity()
    }

    /// Close the engine gracefully
    ///
    /// Syncs the WAL; the memtable is replayed by the next `recover()`
    pub fn close(self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.wal.lock().sync()?;
        info!(memtable = self.memtable.len(), "closed engine");
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Next strictly increasing timestamp (nanoseconds since the epoch)
    fn next_timestamp(&self) -> u64 {
        let now = now_nanos();
        match self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        {
            Ok(last) | Err(last) => now.max(last + 1),
        }
    }

    fn admit(&self) -> Result<()> {
        match &self.limiter {
            Some(limiter) => limiter.try_acquire(),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn memtable(&self) -> &MemTable {
        &self.memtable
    }

    pub fn levels(&self) -> &LevelManager {
        &self.levels
    }

    /// Deepest level holding runs
    pub fn level_count(&self) -> usize {
        self.levels.level_count()
    }

    pub fn run_count(&self, level: usize) -> usize {
        self.levels.run_count(level)
    }

    pub fn level_stats(&self) -> Vec<LevelStats> {
        self.levels.stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Index of the WAL segment currently appended to
    pub fn wal_segment_index(&self) -> u64 {
        self.wal.lock().segment_index()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_dir", &self.config.data_dir)
            .field("memtable", &self.memtable.len())
            .field("runs", &self.levels.total_runs())
            .finish()
    }
}
