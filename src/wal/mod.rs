//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append every mutation before it reaches the memtable
//! - CRC32 checksums over key ‖ value for corruption detection
//! - Flush markers as recovery boundaries
//! - Size-bounded segments, retention trimming
//! - Crash recovery: replay everything after the newest flush marker
//!
//! ## File Format
//! ```text
//! wal/wal-000000.log, wal/wal-000001.log, ...   (append-only, oldest first)
//!
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Entry 1                                                       │
//! │ ┌─────────┬────────┬──────────┬────────┬────────┬─────┬─────┐ │
//! │ │ CRC (4) │ TS (8) │ Flags(1) │ KLen(8)│ VLen(8)│ Key │ Val │ │
//! │ └─────────┴────────┴──────────┴────────┴────────┴─────┴─────┘ │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Flush marker: Flags bit 1 set, no key, no value               │
//! └───────────────────────────────────────────────────────────────┘
//! ```

mod entry;
mod reader;
mod recovery;
mod writer;

pub use crate::record::FRAME_HEADER_SIZE as HEADER_SIZE;
pub use entry::WalEntry;
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
