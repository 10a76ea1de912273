//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Bounded by a distinct-key capacity; updates never count against it
//! - Ordered enumeration for run construction
//!
//! ## Data Structure Choice
//! Two interchangeable backings behind [`OrderedStore`], picked from config
//! at construction:
//! - [`SkipList`]: arena of towers, levels from coin flips
//! - [`BTree`]: classic B-tree with owned child slots (split / borrow / merge)

mod btree;
mod skiplist;
mod table;

pub use btree::BTree;
pub use skiplist::SkipList;
pub use table::MemTable;

use crate::record::Record;

/// Capability shared by the memtable backings.
///
/// Implementations key records by `record.key` and keep them in ascending
/// byte order.
pub trait OrderedStore: Send + Sync {
    /// Insert or replace the record for its key.
    /// Returns `true` when the key was not present before.
    fn put(&mut self, record: Record) -> bool;

    fn get(&self, key: &[u8]) -> Option<&Record>;

    /// Physically remove a key; returns the removed record
    fn remove(&mut self, key: &[u8]) -> Option<Record>;

    /// All records in ascending key order, without mutating the store
    fn drain_sorted(&self) -> Vec<Record>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}
