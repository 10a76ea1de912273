//! Skip list backing
//!
//! Towers live in an arena (`Vec<Tower>`) and link to each other by index, so
//! removal never leaves dangling pointers. Index 0 is the head sentinel and is
//! as tall as the configured max height. A new tower's height is 1 plus the
//! number of consecutive successful coin flips (p = 1/2), capped at the max.

use std::cmp::Ordering;

use rand::Rng;

use super::OrderedStore;
use crate::record::Record;

const HEAD: usize = 0;

struct Tower {
    /// `None` only for the head sentinel and for freed slots
    record: Option<Record>,
    /// Successor at each level, `next.len()` is the tower height
    next: Vec<Option<usize>>,
}

/// Probabilistically balanced ordered map
pub struct SkipList {
    towers: Vec<Tower>,
    /// Freed arena slots available for reuse
    free: Vec<usize>,
    max_height: usize,
    /// Levels currently in use (≥ 1)
    height: usize,
    len: usize,
}

impl SkipList {
    pub fn new(max_height: usize) -> Self {
        let max_height = max_height.max(1);
        Self {
            towers: vec![Tower {
                record: None,
                next: vec![None; max_height],
            }],
            free: Vec::new(),
            max_height,
            height: 1,
            len: 0,
        }
    }

    pub fn max_height(&self) -> usize {
        self.max_height
    }

    fn random_height(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut height = 1;
        while height < self.max_height && rng.gen_bool(0.5) {
            height += 1;
        }
        height
    }

    fn key_of(&self, index: usize) -> &[u8] {
        self.towers[index]
            .record
            .as_ref()
            .map(|r| r.key.as_slice())
            .unwrap_or(&[])
    }

    /// For every level, the last tower whose key is < `key`
    fn predecessors(&self, key: &[u8]) -> Vec<usize> {
        let mut update = vec![HEAD; self.max_height];
        let mut current = HEAD;
        for level in (0..self.height).rev() {
            while let Some(next) = self.towers[current].next[level] {
                if self.key_of(next) < key {
                    current = next;
                } else {
                    break;
                }
            }
            update[level] = current;
        }
        update
    }

    fn alloc(&mut self, tower: Tower) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.towers[index] = tower;
                index
            }
            None => {
                self.towers.push(tower);
                self.towers.len() - 1
            }
        }
    }
}

impl OrderedStore for SkipList {
    fn put(&mut self, record: Record) -> bool {
        let update = self.predecessors(&record.key);

        if let Some(next) = self.towers[update[0]].next[0] {
            if self.key_of(next) == record.key.as_slice() {
                self.towers[next].record = Some(record);
                return false;
            }
        }

        let height = self.random_height();
        if height > self.height {
            // update[] already points at HEAD for the new levels
            self.height = height;
        }

        let index = self.alloc(Tower {
            record: Some(record),
            next: vec![None; height],
        });
        for (level, &prev) in update.iter().enumerate().take(height) {
            self.towers[index].next[level] = self.towers[prev].next[level];
            self.towers[prev].next[level] = Some(index);
        }
        self.len += 1;
        true
    }

    fn get(&self, key: &[u8]) -> Option<&Record> {
        let mut current = HEAD;
        for level in (0..self.height).rev() {
            while let Some(next) = self.towers[current].next[level] {
                match self.key_of(next).cmp(key) {
                    Ordering::Less => current = next,
                    Ordering::Equal => return self.towers[next].record.as_ref(),
                    Ordering::Greater => break,
                }
            }
        }
        None
    }

    fn remove(&mut self, key: &[u8]) -> Option<Record> {
        let update = self.predecessors(key);
        let target = match self.towers[update[0]].next[0] {
            Some(next) if self.key_of(next) == key => next,
            _ => return None,
        };

        let tower_height = self.towers[target].next.len();
        for (level, &prev) in update.iter().enumerate().take(tower_height) {
            if self.towers[prev].next[level] == Some(target) {
                self.towers[prev].next[level] = self.towers[target].next[level];
            }
        }
        while self.height > 1 && self.towers[HEAD].next[self.height - 1].is_none() {
            self.height -= 1;
        }

        let record = self.towers[target].record.take();
        self.towers[target].next.clear();
        self.free.push(target);
        self.len -= 1;
        record
    }

    fn drain_sorted(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.len);
        let mut current = self.towers[HEAD].next[0];
        while let Some(index) = current {
            if let Some(record) = &self.towers[index].record {
                records.push(record.clone());
            }
            current = self.towers[index].next[0];
        }
        records
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.towers.truncate(1);
        self.towers[HEAD].next = vec![None; self.max_height];
        self.free.clear();
        self.height = 1;
        self.len = 0;
    }
}
