//! Sorted Run Module
//!
//! An immutable on-disk table of key-ordered records, produced by a flush or
//! a compaction.
//!
//! ## Segments
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Data        [CRC][TS][Flags][KeyLen][ValLen][Key][Value] ...    │
//! │             same frame as the WAL, strictly increasing keys     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Index       [KeyLen: u64][Key][DataOffset: u64] ... every key   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Summary     first/last key + every Nth index key → index offset │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Filter      bincode(MembershipFilter)                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Integrity   bincode(pre-order hash tree over data chunks)       │
//! └─────────────────────────────────────────────────────────────────┘
//! Descriptor  NNNNNN-descriptor.json: file/offset/size of each segment
//! ```
//!
//! With [`RunLayout::Separate`](crate::config::RunLayout) every segment has
//! its own file; with `Combined` they follow each other in `NNNNNN-run.db`.
//! The descriptor is always its own file and is written last.

mod builder;
mod descriptor;
mod index;
mod iterator;
mod reader;
mod summary;

pub use builder::{RunBuilder, RunOptions};
pub use descriptor::{RunDescriptor, SegmentLocation, FORMAT_VERSION};
pub use iterator::RunIterator;
pub use reader::Run;
pub use summary::Summary;
