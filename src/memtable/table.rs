//! MemTable implementation
//!
//! Capacity-bounded wrapper around an [`OrderedStore`] with an RwLock for
//! concurrency. The capacity counts distinct keys: inserting a new key into a
//! full table fails with [`StrataError::MemTableFull`], replacing the record
//! of a key that is already present always succeeds.

use parking_lot::RwLock;

use super::{BTree, OrderedStore, SkipList};
use crate::config::{Config, MemTableBackend};
use crate::error::{Result, StrataError};
use crate::record::Record;

/// In-memory table for recent writes
pub struct MemTable {
    store: RwLock<Box<dyn OrderedStore>>,
    capacity: usize,
    backend: MemTableBackend,
}

impl MemTable {
    /// Create an empty table with the backing structure picked in `config`
    pub fn new(config: &Config) -> Self {
        let store: Box<dyn OrderedStore> = match config.memtable_backend {
            MemTableBackend::SkipList => Box::new(SkipList::new(config.skiplist_max_height)),
            MemTableBackend::BTree => Box::new(BTree::new(config.btree_degree)),
        };
        Self {
            store: RwLock::new(store),
            capacity: config.memtable_capacity,
            backend: config.memtable_backend,
        }
    }

    /// Insert or update a live value
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: u64) -> Result<()> {
        self.insert(Record::put(key, value, timestamp))
    }

    /// Insert or update a tombstone
    pub fn delete(&self, key: impl Into<Vec<u8>>, timestamp: u64) -> Result<()> {
        self.insert(Record::tombstone(key, timestamp))
    }

    /// Insert a prepared record (used by WAL replay to keep timestamps)
    pub fn insert(&self, record: Record) -> Result<()> {
        let mut store = self.store.write();
        if store.len() >= self.capacity && store.get(&record.key).is_none() {
            return Err(StrataError::MemTableFull {
                capacity: self.capacity,
            });
        }
        store.put(record);
        Ok(())
    }

    /// Latest record for `key`, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        self.store.read().get(key).cloned()
    }

    /// True once the distinct-key count has reached capacity
    pub fn is_full(&self) -> bool {
        self.store.read().len() >= self.capacity
    }

    /// Snapshot of every record in ascending key order
    pub fn drain_sorted(&self) -> Vec<Record> {
        self.store.read().drain_sorted()
    }

    pub fn clear(&self) {
        self.store.write().clear();
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn backend(&self) -> MemTableBackend {
        self.backend
    }
}
