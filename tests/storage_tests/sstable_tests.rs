//! Tests for sorted runs
//!
//! These tests verify:
//! - Run creation in both layouts
//! - Point lookups through filter, summary and bounded index scan
//! - Tombstone handling
//! - Iteration over all entries
//! - Reopening from the descriptor
//! - Integrity verification of the data segment
//! - Deferred deletion of obsolete runs

use std::fs;

use stratakv::config::RunLayout;
use stratakv::paths::{SegmentKind, StoragePaths};
use stratakv::record::{Lookup, Record};
use stratakv::storage::{Run, RunBuilder, RunDescriptor, RunOptions};
use stratakv::StrataError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const LAYOUTS: [RunLayout; 2] = [RunLayout::Separate, RunLayout::Combined];

fn setup() -> (TempDir, StoragePaths) {
    let temp_dir = TempDir::new().unwrap();
    let paths = StoragePaths::new(temp_dir.path());
    paths.create_dirs().unwrap();
    (temp_dir, paths)
}

fn options(layout: RunLayout) -> RunOptions {
    RunOptions {
        layout,
        filter_precision: 0.01,
        summary_step: 3,
        integrity_chunk_size: 64,
    }
}

fn key(i: usize) -> Vec<u8> {
    format!("key{:05}", i).into_bytes()
}

/// Even-numbered keys only, so odd keys fall between entries
fn records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::put(key(i * 2), format!("value{}", i), i as u64 + 1))
        .collect()
}

fn build(paths: &StoragePaths, layout: RunLayout, records: &[Record]) -> Run {
    RunBuilder::build(paths, 1, 1, records, options(layout)).unwrap()
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_every_key_is_found() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let records = records(100);
        let run = build(&paths, layout, &records);

        assert_eq!(run.entry_count(), 100);
        for record in &records {
            assert_eq!(
                run.get(&record.key).unwrap(),
                Lookup::Found(record.value.clone().unwrap()),
                "layout {:?}",
                layout
            );
        }
    }
}

#[test]
fn test_absent_keys_are_not_found() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let run = build(&paths, layout, &records(50));

        // Between entries, before the first and after the last
        for i in 0..50 {
            assert_eq!(run.get(&key(i * 2 + 1)).unwrap(), Lookup::NotFound);
        }
        assert_eq!(run.get(b"a").unwrap(), Lookup::NotFound);
        assert_eq!(run.get(b"zzz").unwrap(), Lookup::NotFound);
        assert_eq!(run.get(b"").unwrap(), Lookup::NotFound);
    }
}

#[test]
fn test_first_and_last_keys() {
    let (_dir, paths) = setup();
    let run = build(&paths, RunLayout::Separate, &records(10));
    assert_eq!(run.first_key(), key(0).as_slice());
    assert_eq!(run.last_key(), key(18).as_slice());
    assert_eq!(run.max_timestamp(), 10);
}

#[test]
fn test_single_record_run() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let run = build(&paths, layout, &[Record::put("only", "one", 7)]);
        assert_eq!(run.get(b"only").unwrap(), Lookup::Found(b"one".to_vec()));
        assert_eq!(run.get(b"other").unwrap(), Lookup::NotFound);
    }
}

#[test]
fn test_tombstones_are_reported_as_deleted() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let records = vec![
            Record::put("a", "1", 1),
            Record::tombstone("b", 2),
            Record::put("c", "3", 3),
        ];
        let run = build(&paths, layout, &records);

        assert_eq!(run.get(b"b").unwrap(), Lookup::Deleted);
        let record = run.point_lookup(b"b").unwrap().unwrap();
        assert!(record.tombstone);
        assert_eq!(record.timestamp, 2);
    }
}

#[test]
fn test_filter_knows_every_key() {
    let (_dir, paths) = setup();
    let records = records(200);
    let run = build(&paths, RunLayout::Separate, &records);
    for record in &records {
        assert!(run.filter().has(&record.key));
    }
}

// =============================================================================
// Builder Validation Tests
// =============================================================================

#[test]
fn test_unsorted_input_is_rejected() {
    let (_dir, paths) = setup();
    let records = vec![Record::put("b", "1", 1), Record::put("a", "2", 2)];
    let err = RunBuilder::build(&paths, 1, 1, &records, options(RunLayout::Separate)).unwrap_err();
    assert!(matches!(err, StrataError::Storage(_)));
}

#[test]
fn test_duplicate_keys_are_rejected() {
    let (_dir, paths) = setup();
    let records = vec![Record::put("a", "1", 1), Record::put("a", "2", 2)];
    assert!(RunBuilder::build(&paths, 1, 1, &records, options(RunLayout::Separate)).is_err());
}

#[test]
fn test_empty_run_is_rejected() {
    let (_dir, paths) = setup();
    assert!(RunBuilder::build(&paths, 1, 1, &[], options(RunLayout::Separate)).is_err());
    assert!(!paths
        .run_file(1, 1, SegmentKind::Descriptor)
        .exists());
}

// =============================================================================
// Iteration & Reopen Tests
// =============================================================================

#[test]
fn test_iter_yields_records_in_order() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let records = records(40);
        let run = build(&paths, layout, &records);

        let read: Vec<Record> = run.iter().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(read, records);
    }
}

#[test]
fn test_reopen_from_descriptor() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let records = records(30);
        drop(build(&paths, layout, &records));

        let run = Run::open(&paths, 1, 1).unwrap();
        assert_eq!(run.descriptor().layout, layout);
        assert_eq!(run.entry_count(), 30);
        assert_eq!(
            run.get(&key(20)).unwrap(),
            Lookup::Found(b"value10".to_vec())
        );
    }
}

#[test]
fn test_descriptor_describes_segments() {
    let (_dir, paths) = setup();
    build(&paths, RunLayout::Separate, &records(5));

    let descriptor = RunDescriptor::load(&paths.run_file(1, 1, SegmentKind::Descriptor)).unwrap();
    assert_eq!(descriptor.level, 1);
    assert_eq!(descriptor.generation, 1);
    assert_eq!(descriptor.entry_count, 5);
    assert_eq!(descriptor.files().len(), 5);
    for file in descriptor.files() {
        assert!(paths.level_dir(1).join(file).exists());
    }
}

#[test]
fn test_combined_layout_uses_one_file() {
    let (_dir, paths) = setup();
    let run = build(&paths, RunLayout::Combined, &records(20));

    let descriptor = run.descriptor();
    assert_eq!(descriptor.files().len(), 1);
    assert_eq!(descriptor.data.offset, 0);
    // Segments follow each other without gaps
    assert_eq!(descriptor.index.offset, descriptor.data.size);
    assert_eq!(
        descriptor.summary.offset,
        descriptor.index.offset + descriptor.index.size
    );

    let names: Vec<_> = fs::read_dir(paths.level_dir(1))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 2);
}

#[test]
fn test_reopen_rejects_missing_segment() {
    let (_dir, paths) = setup();
    drop(build(&paths, RunLayout::Separate, &records(5)));
    fs::remove_file(paths.run_file(1, 1, SegmentKind::Summary)).unwrap();

    assert!(Run::open(&paths, 1, 1).is_err());
}

// =============================================================================
// Integrity Tests
// =============================================================================

#[test]
fn test_intact_run_verifies() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let run = build(&paths, layout, &records(50));
        assert!(run.verify_integrity().unwrap().is_empty());
    }
}

#[test]
fn test_corrupted_chunk_is_located() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let records = records(50);
        let run = build(&paths, layout, &records);

        let data_path = paths.level_dir(1).join(&run.descriptor().data.file);
        let mut bytes = fs::read(&data_path).unwrap();
        // Inside the third 64-byte chunk of the data segment
        bytes[130] ^= 0xFF;
        fs::write(&data_path, bytes).unwrap();

        assert_eq!(run.verify_integrity().unwrap(), vec![2]);
    }
}

#[test]
fn test_corrupted_record_fails_lookup() {
    let (_dir, paths) = setup();
    let records = vec![Record::put("a", "apple", 1), Record::put("b", "banana", 2)];
    let run = build(&paths, RunLayout::Separate, &records);

    let data_path = paths.run_file(1, 1, SegmentKind::Data);
    let mut bytes = fs::read(&data_path).unwrap();
    let last = records[0].encoded_len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&data_path, bytes).unwrap();

    let err = run.get(b"a").unwrap_err();
    assert!(matches!(err, StrataError::Corruption(_)));
    assert_eq!(run.get(b"b").unwrap(), Lookup::Found(b"banana".to_vec()));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_obsolete_run_deletes_files_on_drop() {
    for layout in LAYOUTS {
        let (_dir, paths) = setup();
        let run = build(&paths, layout, &records(5));
        let files = run.files();
        assert!(files.iter().all(|f| f.exists()));

        run.mark_obsolete();
        assert!(files.iter().all(|f| f.exists()));
        drop(run);
        assert!(files.iter().all(|f| !f.exists()));
    }
}

#[test]
fn test_live_run_keeps_files_on_drop() {
    let (_dir, paths) = setup();
    let run = build(&paths, RunLayout::Separate, &records(5));
    let files = run.files();
    drop(run);
    assert!(files.iter().all(|f| f.exists()));
}
