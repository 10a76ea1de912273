//! Tests for the LevelManager
//!
//! These tests verify:
//! - Flushing sorted records as level-1 runs
//! - Lookups across runs and levels (newest first)
//! - Newest-wins compaction with tombstones preserved
//! - Compaction validation errors
//! - Cascading compaction
//! - Persistence (restart and rediscover runs), orphan cleanup
//! - Deferred deletion of compacted runs

use std::fs;

use stratakv::config::Config;
use stratakv::paths::{SegmentKind, StoragePaths};
use stratakv::record::{Lookup, Record};
use stratakv::storage::LevelManager;
use stratakv::StrataError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(fan_out: usize, max_levels: usize) -> (TempDir, StoragePaths, Config) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .level_fan_out(fan_out)
        .max_levels(max_levels)
        .summary_step(2)
        .build();
    let paths = StoragePaths::new(temp_dir.path());
    paths.create_dirs().unwrap();
    (temp_dir, paths, config)
}

fn put(key: &str, value: &str, ts: u64) -> Record {
    Record::put(key, value, ts)
}

fn lookup(manager: &LevelManager, key: &str) -> Lookup {
    match manager.get(key.as_bytes()).unwrap() {
        Some(record) => record.lookup(),
        None => Lookup::NotFound,
    }
}

fn found(value: &str) -> Lookup {
    Lookup::Found(value.as_bytes().to_vec())
}

// =============================================================================
// Flush & Lookup Tests
// =============================================================================

#[test]
fn test_flush_creates_level_one_runs() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    assert_eq!(manager.level_count(), 0);

    let first = manager.flush(&[put("a", "1", 1), put("b", "2", 2)]).unwrap();
    let second = manager.flush(&[put("c", "3", 3)]).unwrap();

    assert_eq!(first.generation(), 1);
    assert_eq!(second.generation(), 2);
    assert_eq!(manager.run_count(1), 2);
    assert_eq!(manager.level_count(), 1);
    assert_eq!(manager.max_timestamp(), 3);
    assert!(paths.run_file(1, 2, SegmentKind::Descriptor).exists());
}

#[test]
fn test_newest_run_wins_lookup() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager.flush(&[put("k", "old", 1), put("x", "x", 2)]).unwrap();
    manager.flush(&[put("k", "new", 3)]).unwrap();

    assert_eq!(lookup(&manager, "k"), found("new"));
    assert_eq!(lookup(&manager, "x"), found("x"));
    assert_eq!(lookup(&manager, "missing"), Lookup::NotFound);
}

#[test]
fn test_lower_level_shadows_higher_level() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager.flush(&[put("k", "deep", 1)]).unwrap();
    manager.compact(1).unwrap();
    manager.flush(&[Record::tombstone("k", 2)]).unwrap();

    assert_eq!(manager.run_count(2), 1);
    assert_eq!(lookup(&manager, "k"), Lookup::Deleted);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compaction_keeps_newest_version() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager
        .flush(&[put("a", "a1", 1), put("k", "v1", 2), put("z", "z1", 3)])
        .unwrap();
    manager.flush(&[put("b", "b2", 4), put("k", "v2", 5)]).unwrap();

    let merged = manager.compact(1).unwrap();
    assert_eq!(merged.level(), 2);
    assert_eq!(merged.entry_count(), 4);
    assert_eq!(manager.run_count(1), 0);
    assert_eq!(manager.run_count(2), 1);

    let records: Vec<Record> = merged.iter().unwrap().collect::<Result<_, _>>().unwrap();
    let keys: Vec<Vec<u8>> = records.iter().map(|r| r.key.clone()).collect();
    assert_eq!(
        keys,
        vec![b"a".to_vec(), b"b".to_vec(), b"k".to_vec(), b"z".to_vec()]
    );
    assert_eq!(records[2], put("k", "v2", 5));
}

#[test]
fn test_newest_timestamp_wins_regardless_of_generation() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager.flush(&[put("k", "newer", 9)]).unwrap();
    manager.flush(&[put("k", "older", 4)]).unwrap();

    manager.compact(1).unwrap();
    assert_eq!(lookup(&manager, "k"), found("newer"));
}

#[test]
fn test_equal_timestamps_go_to_newer_generation() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager.flush(&[put("k", "first", 7)]).unwrap();
    manager.flush(&[put("k", "second", 7)]).unwrap();

    manager.compact(1).unwrap();
    assert_eq!(lookup(&manager, "k"), found("second"));
}

#[test]
fn test_tombstones_survive_compaction() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager.flush(&[put("gone", "v", 1), put("kept", "v", 2)]).unwrap();
    manager.flush(&[Record::tombstone("gone", 3)]).unwrap();

    let merged = manager.compact(1).unwrap();
    assert_eq!(merged.entry_count(), 2);
    assert_eq!(lookup(&manager, "gone"), Lookup::Deleted);

    // Still shadows an older value pushed to the same level later
    manager.compact(2).unwrap();
    assert_eq!(lookup(&manager, "gone"), Lookup::Deleted);
    assert_eq!(lookup(&manager, "kept"), found("v"));
}

#[test]
fn test_compaction_rejects_invalid_levels() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager.flush(&[put("a", "1", 1)]).unwrap();

    for level in [0, 4, 3, 2] {
        let err = manager.compact(level).unwrap_err();
        assert!(
            matches!(err, StrataError::InvalidLevel(_)),
            "level {} gave {:?}",
            level,
            err
        );
    }

    // Level 1 is now empty but still within the levels in use
    manager.compact(1).unwrap();
    assert!(matches!(
        manager.compact(1).unwrap_err(),
        StrataError::InvalidLevel(_)
    ));
}

#[test]
fn test_compact_if_needed_cascades() {
    let (_dir, paths, config) = setup(2, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();

    let mut compactions = Vec::new();
    for i in 0..4u64 {
        let key = format!("k{}", i);
        manager.flush(&[put(&key, "v", i + 1)]).unwrap();
        compactions.push(manager.compact_if_needed(1).unwrap());
    }

    assert_eq!(compactions, vec![0, 1, 0, 2]);
    assert_eq!(manager.run_count(1), 0);
    assert_eq!(manager.run_count(2), 0);
    assert_eq!(manager.run_count(3), 1);
    for i in 0..4 {
        assert_eq!(lookup(&manager, &format!("k{}", i)), found("v"));
    }
}

#[test]
fn test_last_level_accumulates_runs() {
    let (_dir, paths, config) = setup(2, 2);
    let manager = LevelManager::open(&paths, &config).unwrap();

    for i in 0..6u64 {
        manager.flush(&[put(&format!("k{}", i), "v", i + 1)]).unwrap();
        manager.compact_if_needed(1).unwrap();
    }
    assert_eq!(manager.run_count(1), 0);
    assert_eq!(manager.run_count(2), 3);
}

#[test]
fn test_explicit_compact_cascades() {
    let (_dir, paths, config) = setup(2, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();

    manager.flush(&[put("a", "1", 1)]).unwrap();
    manager.compact(1).unwrap();
    manager.flush(&[put("b", "2", 2)]).unwrap();
    manager.compact(1).unwrap();

    assert_eq!(manager.run_count(2), 0);
    assert_eq!(manager.run_count(3), 1);
    assert_eq!(manager.level_count(), 3);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_rediscovers_runs() {
    let (_dir, paths, config) = setup(10, 3);
    {
        let manager = LevelManager::open(&paths, &config).unwrap();
        manager.flush(&[put("a", "1", 1)]).unwrap();
        manager.flush(&[put("b", "2", 2)]).unwrap();
        manager.compact(1).unwrap();
        manager.flush(&[put("c", "3", 3)]).unwrap();
    }

    let manager = LevelManager::open(&paths, &config).unwrap();
    assert_eq!(manager.run_count(1), 1);
    assert_eq!(manager.run_count(2), 1);
    assert_eq!(lookup(&manager, "a"), found("1"));
    assert_eq!(lookup(&manager, "c"), found("3"));

    // Generations continue after the highest one on disk
    let run = manager.flush(&[put("d", "4", 4)]).unwrap();
    assert_eq!(run.generation(), 4);
}

#[test]
fn test_open_removes_orphaned_files() {
    let (_dir, paths, config) = setup(10, 3);
    {
        let manager = LevelManager::open(&paths, &config).unwrap();
        manager.flush(&[put("a", "1", 1)]).unwrap();
    }

    // A run that never got its descriptor, and a half-written descriptor
    let orphan_data = paths.run_file(1, 7, SegmentKind::Data);
    let orphan_index = paths.run_file(1, 7, SegmentKind::Index);
    fs::write(&orphan_data, b"partial").unwrap();
    fs::write(&orphan_index, b"partial").unwrap();
    let mut temp = paths
        .run_file(1, 8, SegmentKind::Descriptor)
        .into_os_string();
    temp.push(".tmp");
    fs::write(&temp, b"{").unwrap();

    let manager = LevelManager::open(&paths, &config).unwrap();
    assert!(!orphan_data.exists());
    assert!(!orphan_index.exists());
    assert!(!std::path::Path::new(&temp).exists());
    assert_eq!(manager.run_count(1), 1);
    assert_eq!(lookup(&manager, "a"), found("1"));
}

#[test]
fn test_compacted_runs_deleted_after_last_reader() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager.flush(&[put("a", "1", 1)]).unwrap();
    manager.flush(&[put("b", "2", 2)]).unwrap();

    let snapshot = manager.runs(1);
    let files: Vec<_> = snapshot.iter().flat_map(|run| run.files()).collect();

    manager.compact(1).unwrap();
    // An in-flight reader still holds the old runs
    assert!(files.iter().all(|f| f.exists()));
    assert_eq!(
        snapshot[0].get(b"a").unwrap(),
        Lookup::Found(b"1".to_vec())
    );

    drop(snapshot);
    assert!(files.iter().all(|f| !f.exists()));
    assert_eq!(lookup(&manager, "b"), found("2"));
}

#[test]
fn test_stats_and_integrity() {
    let (_dir, paths, config) = setup(10, 3);
    let manager = LevelManager::open(&paths, &config).unwrap();
    manager.flush(&[put("a", "1", 1), put("b", "2", 2)]).unwrap();
    manager.flush(&[put("c", "3", 3)]).unwrap();

    let stats = manager.stats();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats[0].generations, vec![1, 2]);
    assert_eq!(stats[0].entries, 3);
    assert!(stats[1].generations.is_empty());

    assert!(manager.verify_integrity().unwrap().is_empty());
}
