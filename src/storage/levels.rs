//! Level Manager
//!
//! Owns every linked run, grouped by level, and drives compaction.
//!
//! ## Responsibilities
//! - Discover runs on startup (descriptor present ⇒ linked), delete orphans
//! - Write flushed memtables as new runs at level 1
//! - Merge all runs of a level into one run at the next level
//! - Disk lookups: level 1 first, newest generation first within a level
//!
//! ## Concurrency
//! - `levels`: RwLock over the run lists. Readers clone the `Arc<Run>`s they
//!   need and release the lock before touching disk.
//! - `compaction_guards`: one Mutex per level, so a level is never compacted
//!   twice at once while different levels may compact concurrently.
//! - A compacted run is marked obsolete; its files are deleted when the last
//!   `Arc` (possibly held by an in-flight read) is dropped.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::paths::{StoragePaths, TEMP_SUFFIX};
use crate::record::Record;

use super::sstable::{Run, RunBuilder, RunIterator, RunOptions};

/// Runs of one level, oldest generation first
#[derive(Default)]
struct Level {
    runs: Vec<Arc<Run>>,
    next_generation: u64,
}

/// Snapshot of one level for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelStats {
    pub level: usize,
    pub generations: Vec<u64>,
    pub entries: u64,
}

/// Manages the on-disk levels
pub struct LevelManager {
    paths: StoragePaths,
    options: RunOptions,
    max_levels: usize,
    fan_out: usize,
    /// `levels[n - 1]` holds level `n`
    levels: RwLock<Vec<Level>>,
    compaction_guards: Vec<Mutex<()>>,
}

impl LevelManager {
    /// Open the data directory, link every run that has a descriptor and
    /// delete the files of runs that never got one
    pub fn open(paths: &StoragePaths, config: &Config) -> Result<Self> {
        fs::create_dir_all(paths.data_dir())?;

        let mut levels = Vec::with_capacity(config.max_levels);
        for level in 1..=config.max_levels {
            levels.push(Self::load_level(paths, level)?);
        }

        for entry in fs::read_dir(paths.data_dir())? {
            let path = entry?.path();
            if let Some(level) = StoragePaths::parse_level_dir(&path) {
                if level == 0 || level > config.max_levels {
                    warn!(dir = %path.display(), "ignoring level directory beyond max_levels");
                }
            }
        }

        let manager = Self {
            paths: paths.clone(),
            options: RunOptions::from_config(config),
            max_levels: config.max_levels,
            fan_out: config.level_fan_out,
            levels: RwLock::new(levels),
            compaction_guards: (0..config.max_levels).map(|_| Mutex::new(())).collect(),
        };

        info!(
            runs = manager.total_runs(),
            levels = manager.level_count(),
            "opened level manager"
        );
        Ok(manager)
    }

    fn load_level(paths: &StoragePaths, level: usize) -> Result<Level> {
        let dir = paths.level_dir(level);
        if !dir.exists() {
            return Ok(Level {
                runs: Vec::new(),
                next_generation: 1,
            });
        }

        let mut linked = HashSet::new();
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(TEMP_SUFFIX))
                .unwrap_or(false);
            if !is_temp && StoragePaths::is_descriptor(&path) {
                if let Some(generation) = StoragePaths::parse_run_generation(&path) {
                    linked.insert(generation);
                }
            }
            files.push((path, is_temp));
        }

        // Orphans: temp files, and files of runs that never got a descriptor
        for (path, is_temp) in files {
            let orphan = is_temp
                || StoragePaths::parse_run_generation(&path)
                    .map(|generation| !linked.contains(&generation))
                    .unwrap_or(false);
            if orphan {
                warn!(file = %path.display(), "removing orphaned run file");
                fs::remove_file(&path)?;
            }
        }

        let mut generations: Vec<u64> = linked.into_iter().collect();
        generations.sort_unstable();

        let mut runs = Vec::with_capacity(generations.len());
        for generation in &generations {
            runs.push(Arc::new(Run::open(paths, level, *generation)?));
        }
        debug!(level, runs = runs.len(), "loaded level");

        Ok(Level {
            runs,
            next_generation: generations.last().map(|g| g + 1).unwrap_or(1),
        })
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Write sorted records as a new run at level 1.
    ///
    /// Compaction is left to [`compact_if_needed`](Self::compact_if_needed)
    /// so the caller can make the flush durable first.
    pub fn flush(&self, records: &[Record]) -> Result<Arc<Run>> {
        let generation = self.allocate_generation(1);
        let run = Arc::new(RunBuilder::build(
            &self.paths,
            1,
            generation,
            records,
            self.options,
        )?);

        self.levels.write()[0].runs.push(Arc::clone(&run));
        info!(generation, entries = records.len(), "flushed memtable to level 1");
        Ok(run)
    }

    fn allocate_generation(&self, level: usize) -> u64 {
        let mut levels = self.levels.write();
        let slot = &mut levels[level - 1];
        let generation = slot.next_generation;
        slot.next_generation += 1;
        generation
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Compact every level, starting at `level`, that holds at least
    /// `fan_out` runs and is below the last level. Returns how many
    /// compactions ran.
    pub fn compact_if_needed(&self, mut level: usize) -> Result<usize> {
        let mut compactions = 0;
        while level >= 1 && level < self.max_levels && self.run_count(level) >= self.fan_out {
            self.compact_once(level)?;
            compactions += 1;
            level += 1;
        }
        Ok(compactions)
    }

    /// Merge all runs of `level` into one run at `level + 1`, then cascade
    /// if the next level overflows
    pub fn compact(&self, level: usize) -> Result<Arc<Run>> {
        let run = self.compact_once(level)?;
        self.compact_if_needed(level + 1)?;
        Ok(run)
    }

    fn validate_compaction(&self, level: usize) -> Result<()> {
        if level == 0 || level > self.max_levels {
            return Err(StrataError::InvalidLevel(format!(
                "level {} does not exist (levels are 1..={})",
                level, self.max_levels
            )));
        }
        if level == self.max_levels {
            return Err(StrataError::InvalidLevel(format!(
                "level {} is the last level and cannot be compacted",
                level
            )));
        }
        let in_use = self.level_count();
        if level > in_use {
            return Err(StrataError::InvalidLevel(format!(
                "level {} is beyond the deepest level in use ({})",
                level, in_use
            )));
        }
        if self.run_count(level) == 0 {
            return Err(StrataError::InvalidLevel(format!("level {} is empty", level)));
        }
        Ok(())
    }

    fn compact_once(&self, level: usize) -> Result<Arc<Run>> {
        self.validate_compaction(level)?;
        let _guard = self.compaction_guards[level - 1].lock();

        let sources = self.runs(level);
        if sources.is_empty() {
            return Err(StrataError::InvalidLevel(format!("level {} is empty", level)));
        }

        let target = level + 1;
        let generation = self.allocate_generation(target);
        let expected: u64 = sources.iter().map(|r| r.entry_count()).sum();

        let mut builder = RunBuilder::new(
            &self.paths,
            target,
            generation,
            expected as usize,
            self.options,
        )?;
        let written = merge_runs(&sources, &mut builder)?;
        let output = Arc::new(builder.finish()?);

        {
            let mut levels = self.levels.write();
            let replaced: HashSet<u64> = sources.iter().map(|r| r.generation()).collect();
            levels[level - 1]
                .runs
                .retain(|run| !replaced.contains(&run.generation()));
            levels[target - 1].runs.push(Arc::clone(&output));
        }
        for run in &sources {
            run.mark_obsolete();
        }

        info!(
            from = level,
            to = target,
            sources = sources.len(),
            input = expected,
            output = written,
            generation,
            "compacted level"
        );
        Ok(output)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Newest record for `key` on disk, tombstones included
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        // Lookup order, captured under the lock: level 1 → max, newest run first
        let order: Vec<Arc<Run>> = {
            let levels = self.levels.read();
            levels
                .iter()
                .flat_map(|level| level.runs.iter().rev().cloned())
                .collect()
        };

        for run in order {
            if let Some(record) = run.point_lookup(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Check every linked run; returns (level, generation, damaged chunks)
    /// for each run that fails
    pub fn verify_integrity(&self) -> Result<Vec<(usize, u64, Vec<usize>)>> {
        let mut failures = Vec::new();
        for level in 1..=self.max_levels {
            for run in self.runs(level) {
                let damaged = run.verify_integrity()?;
                if !damaged.is_empty() {
                    failures.push((level, run.generation(), damaged));
                }
            }
        }
        Ok(failures)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Deepest level holding at least one run (0 when empty)
    pub fn level_count(&self) -> usize {
        let levels = self.levels.read();
        levels
            .iter()
            .rposition(|level| !level.runs.is_empty())
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn run_count(&self, level: usize) -> usize {
        if level == 0 {
            return 0;
        }
        self.levels
            .read()
            .get(level - 1)
            .map(|l| l.runs.len())
            .unwrap_or(0)
    }

    /// Runs of `level`, oldest generation first
    pub fn runs(&self, level: usize) -> Vec<Arc<Run>> {
        if level == 0 {
            return Vec::new();
        }
        self.levels
            .read()
            .get(level - 1)
            .map(|l| l.runs.clone())
            .unwrap_or_default()
    }

    pub fn total_runs(&self) -> usize {
        self.levels.read().iter().map(|l| l.runs.len()).sum()
    }

    /// Newest timestamp stored in any run (0 when empty)
    pub fn max_timestamp(&self) -> u64 {
        self.levels
            .read()
            .iter()
            .flat_map(|l| l.runs.iter().map(|r| r.max_timestamp()))
            .max()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> Vec<LevelStats> {
        self.levels
            .read()
            .iter()
            .enumerate()
            .map(|(i, level)| LevelStats {
                level: i + 1,
                generations: level.runs.iter().map(|r| r.generation()).collect(),
                entries: level.runs.iter().map(|r| r.entry_count()).sum(),
            })
            .collect()
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    pub fn fan_out(&self) -> usize {
        self.fan_out
    }
}

// =============================================================================
// K-way Merge
// =============================================================================

/// Merge `sources` (oldest generation first) into `builder`, writing one
/// record per distinct key.
///
/// The smallest key across all heads goes next. Among records with that key
/// the larger timestamp wins; on equal timestamps the newer generation wins.
/// Tombstones are carried through like any other record.
fn merge_runs(sources: &[Arc<Run>], builder: &mut RunBuilder) -> Result<u64> {
    let mut iters: Vec<RunIterator> = sources
        .iter()
        .map(|run| run.iter())
        .collect::<Result<_>>()?;
    let mut heads: Vec<Option<Record>> = iters
        .iter_mut()
        .map(|it| it.next().transpose())
        .collect::<Result<_>>()?;

    let mut written = 0;
    loop {
        let min_key = match heads.iter().flatten().map(|r| &r.key).min() {
            Some(key) => key.clone(),
            None => break,
        };

        let mut winner: Option<Record> = None;
        for (i, head) in heads.iter_mut().enumerate() {
            if !matches!(head, Some(record) if record.key == min_key) {
                continue;
            }
            if let Some(record) = head.take() {
                let newer = winner
                    .as_ref()
                    .map_or(true, |current| record.timestamp >= current.timestamp);
                if newer {
                    winner = Some(record);
                }
            }
            *head = iters[i].next().transpose()?;
        }

        if let Some(record) = winner {
            builder.add(&record)?;
            written += 1;
        }
    }
    Ok(written)
}
