//! Recency cache
//!
//! A fixed-capacity key → value map with least-recently-used eviction,
//! sitting between the memtable and the disk levels. It is filled only from
//! confirmed disk reads and cleared in bulk on every flush.
//!
//! Every `clear()` starts a new epoch. A reader takes the epoch before going
//! to disk and inserts with [`RecencyCache::put_if_current`], so a value read
//! before a flush can never land in the cache after it.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

/// Hit / miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

struct CacheState {
    map: LruCache<Vec<u8>, Vec<u8>>,
    epoch: u64,
}

/// Bounded LRU cache of disk-resident values
pub struct RecencyCache {
    inner: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RecencyCache {
    /// `capacity` is clamped to at least one entry
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheState {
                map: LruCache::new(capacity),
                epoch: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a value, marking it most recently used
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let value = self.inner.lock().map.get(key).cloned();
        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Insert or refresh a value, evicting the least recently used on overflow
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.inner.lock().map.put(key, value);
    }

    /// Insert only if no `clear()` happened since `epoch` was taken
    pub fn put_if_current(&self, key: Vec<u8>, value: Vec<u8>, epoch: u64) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        state.map.put(key, value);
        true
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Drop every entry and start a new epoch
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.map.clear();
        state.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().map.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}
