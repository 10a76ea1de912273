//! # StrataKV
//!
//! An embedded LSM-tree key-value storage engine with:
//! - Segmented Write-Ahead Log (WAL) with flush markers
//! - Crash recovery with torn-tail repair
//! - Skip list or B-tree memtable, bounded by distinct keys
//! - Immutable sorted runs with filter, sparse summary and integrity tree
//! - Leveled compaction (newest version wins, tombstones kept)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Engine (put / get / delete)                 │
//! │          rate limiter · Single Writer / Multi Reader         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────┐
//!          │            │                 │
//!          ▼            ▼                 ▼
//!   ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//!   │     WAL     │ │  MemTable   │ │   Recency   │
//!   │ (segments)  │ │  (RwLock)   │ │    Cache    │
//!   └─────────────┘ └──────┬──────┘ └─────────────┘
//!                          │ flush
//!                          ▼
//!                  ┌───────────────┐
//!                  │ Level Manager │  level 1 → level 2 → … (compaction)
//!                  │ (sorted runs) │
//!                  └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod paths;

pub mod record;
pub mod hash;
pub mod filter;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod cache;
pub mod limiter;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StrataError, Result};
pub use config::{Config, ConfigBuilder, MemTableBackend, RunLayout, WalSyncStrategy};
pub use engine::Engine;
pub use record::{Lookup, Record};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StrataKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
