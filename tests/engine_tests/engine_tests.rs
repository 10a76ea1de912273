//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/put/delete operations
//! - Capacity-triggered flushes and compaction
//! - Memtable-first resolution over older runs
//! - Crash recovery from WAL
//! - Rate limiting and the recency cache
//! - Concurrent access patterns
//! - Engine lifecycle (open/recover/close)

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stratakv::config::{Config, ConfigBuilder, MemTableBackend, RunLayout, WalSyncStrategy};
use stratakv::{Engine, Lookup, StrataError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn base_config(path: &Path) -> ConfigBuilder {
    Config::builder()
        .data_dir(path)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite) // Sync every write for test reliability
}

fn open(config: Config) -> Engine {
    let engine = Engine::open(config).unwrap();
    engine.recover().unwrap();
    engine
}

fn setup_temp_engine(capacity: usize, fan_out: usize) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = base_config(temp_dir.path())
        .memtable_capacity(capacity)
        .level_fan_out(fan_out)
        .build();
    let engine = open(config);
    (temp_dir, engine)
}

fn found(value: &str) -> Lookup {
    Lookup::Found(value.as_bytes().to_vec())
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_put_and_get() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    assert!(!engine.put(b"hello", b"world").unwrap());
    assert_eq!(engine.get(b"hello").unwrap(), found("world"));
    assert_eq!(engine.get(b"missing").unwrap(), Lookup::NotFound);
}

#[test]
fn test_round_trip_survives_flush() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    for i in 0..10 {
        engine
            .put(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }
    assert!(engine.flush().unwrap());
    assert!(engine.memtable().is_empty());
    assert_eq!(engine.run_count(1), 1);

    for i in 0..10 {
        assert_eq!(
            engine.get(format!("key{}", i).as_bytes()).unwrap(),
            found(&format!("value{}", i))
        );
    }
}

#[test]
fn test_flush_of_empty_memtable_is_noop() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    assert!(!engine.flush().unwrap());
    assert_eq!(engine.run_count(1), 0);
}

#[test]
fn test_overwrite_returns_latest() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    engine.put(b"k", b"v1").unwrap();
    engine.flush().unwrap();
    engine.put(b"k", b"v2").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), found("v2"));

    engine.flush().unwrap();
    engine.compact_level(1).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), found("v2"));
}

// =============================================================================
// Tombstones
// =============================================================================

#[test]
fn test_delete_hides_value() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    engine.put(b"k", b"v").unwrap();
    engine.delete(b"k").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Lookup::Deleted);
    assert!(!engine.get(b"k").unwrap().is_found());
}

#[test]
fn test_delete_survives_flush_and_compaction() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    engine.put(b"k", b"v").unwrap();
    engine.flush().unwrap();
    engine.delete(b"k").unwrap();
    engine.flush().unwrap();
    assert!(!engine.get(b"k").unwrap().is_found());

    engine.compact_level(1).unwrap();
    assert!(!engine.get(b"k").unwrap().is_found());
}

#[test]
fn test_delete_of_unknown_key() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    engine.delete(b"never-written").unwrap();
    assert!(!engine.get(b"never-written").unwrap().is_found());
}

// =============================================================================
// Capacity & Compaction
// =============================================================================

#[test]
fn test_capacity_triggers_flush() {
    let (_dir, engine) = setup_temp_engine(2, 4);
    assert!(!engine.put(b"b", b"2").unwrap());
    assert!(engine.put(b"a", b"1").unwrap());

    assert!(engine.memtable().is_empty());
    let runs = engine.levels().runs(1);
    assert_eq!(runs.len(), 1);
    let keys: Vec<Vec<u8>> = runs[0]
        .iter()
        .unwrap()
        .map(|r| r.unwrap().key)
        .collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn test_delete_can_trigger_flush() {
    let (_dir, engine) = setup_temp_engine(2, 4);
    engine.put(b"a", b"1").unwrap();
    assert!(engine.delete(b"b").unwrap());
    assert_eq!(engine.run_count(1), 1);
}

#[test]
fn test_updates_do_not_count_against_capacity() {
    let (_dir, engine) = setup_temp_engine(2, 4);
    engine.put(b"a", b"1").unwrap();
    for i in 0..10 {
        assert!(!engine.put(b"a", format!("{}", i).as_bytes()).unwrap());
    }
    assert_eq!(engine.memtable().len(), 1);
    assert_eq!(engine.run_count(1), 0);
}

#[test]
fn test_fan_out_triggers_compaction() {
    let (_dir, engine) = setup_temp_engine(1, 2);
    engine.put(b"a", b"1").unwrap();
    assert_eq!(engine.run_count(1), 1);
    engine.put(b"b", b"2").unwrap();

    assert_eq!(engine.run_count(1), 0);
    assert_eq!(engine.run_count(2), 1);
    assert_eq!(engine.get(b"a").unwrap(), found("1"));
    assert_eq!(engine.get(b"b").unwrap(), found("2"));
}

#[test]
fn test_memtable_overrides_older_runs() {
    let (_dir, engine) = setup_temp_engine(2, 2);

    assert!(!engine.put(b"r", b"a").unwrap());
    assert!(engine.put(b"s", b"b").unwrap());
    assert!(!engine.put(b"s", b"g").unwrap());
    assert!(engine.put(b"a", b"c").unwrap());
    // Two level-1 runs reached the fan-out and were merged
    assert_eq!(engine.run_count(1), 0);
    assert_eq!(engine.run_count(2), 1);

    assert!(!engine.delete(b"a").unwrap());
    assert!(engine.delete(b"r").unwrap());
    assert!(!engine.put(b"a", b"//").unwrap());

    assert_eq!(engine.get(b"a").unwrap(), found("//"));
    assert!(!engine.get(b"r").unwrap().is_found());
    assert_eq!(engine.get(b"s").unwrap(), found("g"));
}

#[test]
fn test_compact_level_validation() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    assert!(matches!(
        engine.compact_level(1).unwrap_err(),
        StrataError::InvalidLevel(_)
    ));

    engine.put(b"k", b"v").unwrap();
    engine.flush().unwrap();
    let max = engine.config().max_levels;
    assert!(matches!(
        engine.compact_level(max).unwrap_err(),
        StrataError::InvalidLevel(_)
    ));
    engine.compact_level(1).unwrap();
    assert_eq!(engine.level_count(), 2);
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_recovery_replays_unflushed_writes() {
    let temp_dir = TempDir::new().unwrap();
    let config = base_config(temp_dir.path()).memtable_capacity(100).build();
    {
        let engine = open(config.clone());
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.delete(b"a").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(config).unwrap();
    let result = engine.recover().unwrap();
    assert_eq!(result.entries_recovered, 3);
    assert_eq!(engine.get(b"a").unwrap(), Lookup::Deleted);
    assert_eq!(engine.get(b"b").unwrap(), found("2"));
}

#[test]
fn test_recovery_skips_flushed_writes() {
    let temp_dir = TempDir::new().unwrap();
    let config = base_config(temp_dir.path()).memtable_capacity(2).build();
    {
        let engine = open(config.clone());
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap(); // flush
        engine.put(b"c", b"3").unwrap();
        // Dropped without close: simulated crash
    }

    let engine = Engine::open(config).unwrap();
    let result = engine.recover().unwrap();
    assert!(result.found_flush_marker);
    assert_eq!(result.entries_recovered, 1);
    assert_eq!(engine.memtable().len(), 1);
    for (key, value) in [("a", "1"), ("b", "2"), ("c", "3")] {
        assert_eq!(engine.get(key.as_bytes()).unwrap(), found(value));
    }
}

#[test]
fn test_recovery_flushes_when_replay_overflows() {
    let temp_dir = TempDir::new().unwrap();
    {
        let config = base_config(temp_dir.path()).memtable_capacity(100).build();
        let engine = open(config);
        for i in 0..5 {
            engine.put(format!("k{}", i).as_bytes(), b"v").unwrap();
        }
    }

    let config = base_config(temp_dir.path()).memtable_capacity(2).build();
    {
        let engine = open(config.clone());
        assert!(engine.memtable().is_empty());
        assert_eq!(engine.run_count(1), 3);
        for i in 0..5 {
            assert_eq!(engine.get(format!("k{}", i).as_bytes()).unwrap(), found("v"));
        }
    }

    // The replayed writes are now behind a flush marker
    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.recover().unwrap().entries_recovered, 0);
    assert_eq!(engine.run_count(1), 3);
}

#[test]
fn test_newer_writes_win_after_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = base_config(temp_dir.path()).memtable_capacity(100).build();
    {
        let engine = open(config.clone());
        engine.put(b"k", b"old").unwrap();
        engine.flush().unwrap();
        engine.close().unwrap();
    }
    {
        let engine = open(config.clone());
        engine.put(b"k", b"new").unwrap();
        engine.flush().unwrap();
        engine.compact_level(1).unwrap();
        engine.close().unwrap();
    }

    let engine = open(config);
    assert_eq!(engine.get(b"k").unwrap(), found("new"));
}

#[test]
fn test_cleanup_log_keeps_data_recoverable() {
    let temp_dir = TempDir::new().unwrap();
    let config = base_config(temp_dir.path())
        .memtable_capacity(4)
        .wal_segment_size(128)
        .wal_retained_segments(1)
        .build();
    {
        let engine = open(config.clone());
        for i in 0..10 {
            engine.put(format!("k{}", i).as_bytes(), b"value").unwrap();
        }
        assert!(engine.cleanup_log().unwrap() > 0);
        engine.close().unwrap();
    }

    let engine = open(config);
    for i in 0..10 {
        assert_eq!(engine.get(format!("k{}", i).as_bytes()).unwrap(), found("value"));
    }
}

// =============================================================================
// Admission & Cache
// =============================================================================

#[test]
fn test_rate_limiter_rejects_excess_requests() {
    let temp_dir = TempDir::new().unwrap();
    let config = base_config(temp_dir.path())
        .rate_limit(Duration::from_secs(60), 3)
        .build();
    let engine = open(config);

    engine.put(b"a", b"1").unwrap();
    engine.get(b"a").unwrap();
    engine.delete(b"a").unwrap();
    assert!(matches!(
        engine.put(b"b", b"2").unwrap_err(),
        StrataError::RateLimited
    ));
    assert!(matches!(engine.get(b"a").unwrap_err(), StrataError::RateLimited));
}

#[test]
fn test_cache_serves_repeated_disk_reads() {
    let (_dir, engine) = setup_temp_engine(16, 4);
    engine.put(b"k", b"v1").unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.get(b"k").unwrap(), found("v1"));
    assert_eq!(engine.get(b"k").unwrap(), found("v1"));
    assert_eq!(engine.cache_stats().hits, 1);

    // A flush clears the cache, so the new value is read from disk
    engine.put(b"k", b"v2").unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.cache_stats().len, 0);
    assert_eq!(engine.get(b"k").unwrap(), found("v2"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = base_config(temp_dir.path()).memtable_capacity(0).build();
    assert!(matches!(
        Engine::open(config).unwrap_err(),
        StrataError::Config(_)
    ));

    let config = base_config(temp_dir.path()).filter_precision(1.0).build();
    assert!(matches!(
        Engine::open(config).unwrap_err(),
        StrataError::Config(_)
    ));
}

// =============================================================================
// Configurations
// =============================================================================

#[test]
fn test_btree_backend_with_combined_runs() {
    let temp_dir = TempDir::new().unwrap();
    let config = base_config(temp_dir.path())
        .memtable_backend(MemTableBackend::BTree)
        .btree_degree(2)
        .run_layout(RunLayout::Combined)
        .memtable_capacity(8)
        .level_fan_out(2)
        .build();
    let engine = open(config);

    for i in (0..50).rev() {
        engine
            .put(format!("key{:03}", i).as_bytes(), format!("{}", i).as_bytes())
            .unwrap();
    }
    for i in (0..50).step_by(3) {
        engine.delete(format!("key{:03}", i).as_bytes()).unwrap();
    }

    for i in 0..50 {
        let result = engine.get(format!("key{:03}", i).as_bytes()).unwrap();
        if i % 3 == 0 {
            assert!(!result.is_found(), "key{:03} should be deleted", i);
        } else {
            assert_eq!(result, found(&format!("{}", i)));
        }
    }
    assert!(engine.verify_integrity().unwrap().is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_reads_and_writes() {
    let (_dir, engine) = setup_temp_engine(32, 2);
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for t in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let key = format!("t{}-k{}", t, i);
                engine.put(key.as_bytes(), key.as_bytes()).unwrap();
                assert_eq!(
                    engine.get(key.as_bytes()).unwrap(),
                    Lookup::Found(key.clone().into_bytes())
                );
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..4 {
        for i in 0..50 {
            let key = format!("t{}-k{}", t, i);
            assert!(engine.get(key.as_bytes()).unwrap().is_found());
        }
    }
}
