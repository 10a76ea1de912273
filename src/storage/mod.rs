//! Storage Module
//!
//! Persistent storage layer: immutable sorted runs grouped into levels.
//!
//! ## Responsibilities
//! - Persist flushed memtables as sorted runs at level 1
//! - Point lookups through filter → summary → index → data
//! - Leveled compaction with newest-wins merging
//! - Integrity verification of data segments
//! - Garbage-collect runs that never got a descriptor
//!
//! ## Directory Layout
//! ```text
//! data/
//!   ├── level-001/   000001-*.db, 000001-descriptor.json, 000002-*, ...
//!   ├── level-002/
//!   └── ...
//! ```

pub mod integrity;
mod levels;
pub mod sstable;

pub use integrity::{IntegrityTree, IntegrityTreeBuilder};
pub use levels::{LevelManager, LevelStats};
pub use sstable::{Run, RunBuilder, RunDescriptor, RunIterator, RunOptions};
