//! B-tree backing
//!
//! Minimum degree `t`: every node except the root holds between `t - 1` and
//! `2t - 1` records, an internal node with `n` records has `n + 1` children,
//! and all leaves sit at the same depth. Inserts split full nodes on the way
//! down; removals make sure a child has at least `t` records before descending
//! into it (borrow from a sibling, or merge with one).

use std::cmp::Ordering;
use std::mem;

use super::OrderedStore;
use crate::record::Record;

struct Node {
    records: Vec<Record>,
    /// Empty for leaves
    children: Vec<Box<Node>>,
}

impl Node {
    fn leaf() -> Self {
        Self {
            records: Vec::new(),
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.records
            .binary_search_by(|r| r.key.as_slice().cmp(key))
    }

    fn find_mut(&mut self, key: &[u8]) -> Option<&mut Record> {
        match self.search(key) {
            Ok(i) => Some(&mut self.records[i]),
            Err(_) if self.is_leaf() => None,
            Err(i) => self.children[i].find_mut(key),
        }
    }

    // -------------------------------------------------------------------------
    // Insert
    // -------------------------------------------------------------------------

    /// Split the full child `i` around its median, which moves up into `self`
    fn split_child(&mut self, i: usize, degree: usize) {
        let child = &mut self.children[i];
        let right_records = child.records.split_off(degree);
        let median = child.records.remove(degree - 1);
        let right_children = if child.is_leaf() {
            Vec::new()
        } else {
            child.children.split_off(degree)
        };

        self.records.insert(i, median);
        self.children.insert(
            i + 1,
            Box::new(Node {
                records: right_records,
                children: right_children,
            }),
        );
    }

    /// Insert into a node known to have room. Returns `true` for a new key.
    fn insert_non_full(&mut self, record: Record, degree: usize) -> bool {
        let mut i = match self.search(&record.key) {
            Ok(i) => {
                self.records[i] = record;
                return false;
            }
            Err(i) => i,
        };

        if self.is_leaf() {
            self.records.insert(i, record);
            return true;
        }

        if self.children[i].records.len() == 2 * degree - 1 {
            self.split_child(i, degree);
            match record.key.as_slice().cmp(&self.records[i].key) {
                Ordering::Greater => i += 1,
                Ordering::Equal => {
                    self.records[i] = record;
                    return false;
                }
                Ordering::Less => {}
            }
        }
        self.children[i].insert_non_full(record, degree)
    }

    // -------------------------------------------------------------------------
    // Remove
    // -------------------------------------------------------------------------

    fn remove(&mut self, key: &[u8], degree: usize) -> Option<Record> {
        match self.search(key) {
            Ok(i) if self.is_leaf() => Some(self.records.remove(i)),
            Ok(i) => {
                if self.children[i].records.len() >= degree {
                    let predecessor = self.children[i].pop_max(degree)?;
                    Some(mem::replace(&mut self.records[i], predecessor))
                } else if self.children[i + 1].records.len() >= degree {
                    let successor = self.children[i + 1].pop_min(degree)?;
                    Some(mem::replace(&mut self.records[i], successor))
                } else {
                    self.merge_children(i);
                    self.children[i].remove(key, degree)
                }
            }
            Err(_) if self.is_leaf() => None,
            Err(i) => {
                let i = self.fill_child(i, degree);
                self.children[i].remove(key, degree)
            }
        }
    }

    fn pop_max(&mut self, degree: usize) -> Option<Record> {
        if self.is_leaf() {
            return self.records.pop();
        }
        let i = self.fill_child(self.children.len() - 1, degree);
        self.children[i].pop_max(degree)
    }

    fn pop_min(&mut self, degree: usize) -> Option<Record> {
        if self.is_leaf() {
            if self.records.is_empty() {
                return None;
            }
            return Some(self.records.remove(0));
        }
        let i = self.fill_child(0, degree);
        self.children[i].pop_min(degree)
    }

    /// Make sure child `i` holds at least `degree` records before descending.
    /// Returns the index of the child that now covers the same key range.
    fn fill_child(&mut self, i: usize, degree: usize) -> usize {
        if self.children[i].records.len() >= degree {
            return i;
        }
        if i > 0 && self.children[i - 1].records.len() >= degree {
            self.borrow_from_left(i);
            return i;
        }
        if i + 1 < self.children.len() && self.children[i + 1].records.len() >= degree {
            self.borrow_from_right(i);
            return i;
        }
        if i + 1 < self.children.len() {
            self.merge_children(i);
            i
        } else {
            self.merge_children(i - 1);
            i - 1
        }
    }

    /// Rotate the left sibling's last record through the separator into child `i`
    fn borrow_from_left(&mut self, i: usize) {
        let (before, after) = self.children.split_at_mut(i);
        let left = &mut before[i - 1];
        let child = &mut after[0];
        if let Some(last) = left.records.pop() {
            let separator = mem::replace(&mut self.records[i - 1], last);
            child.records.insert(0, separator);
            if let Some(grandchild) = left.children.pop() {
                child.children.insert(0, grandchild);
            }
        }
    }

    /// Rotate the right sibling's first record through the separator into child `i`
    fn borrow_from_right(&mut self, i: usize) {
        let (before, after) = self.children.split_at_mut(i + 1);
        let child = &mut before[i];
        let right = &mut after[0];
        if right.records.is_empty() {
            return;
        }
        let first = right.records.remove(0);
        let separator = mem::replace(&mut self.records[i], first);
        child.records.push(separator);
        if !right.children.is_empty() {
            child.children.push(right.children.remove(0));
        }
    }

    /// Fold the separator `i` and child `i + 1` into child `i`
    fn merge_children(&mut self, i: usize) {
        let right = *self.children.remove(i + 1);
        let separator = self.records.remove(i);
        let left = &mut self.children[i];
        left.records.push(separator);
        left.records.extend(right.records);
        left.children.extend(right.children);
    }

    fn collect_in_order(&self, out: &mut Vec<Record>) {
        for (i, record) in self.records.iter().enumerate() {
            if let Some(child) = self.children.get(i) {
                child.collect_in_order(out);
            }
            out.push(record.clone());
        }
        if let Some(last) = self.children.get(self.records.len()) {
            last.collect_in_order(out);
        }
    }
}

/// Ordered map backed by a B-tree of minimum degree `t`
pub struct BTree {
    root: Box<Node>,
    degree: usize,
    len: usize,
}

impl BTree {
    /// `degree` is clamped to at least 2
    pub fn new(degree: usize) -> Self {
        Self {
            root: Box::new(Node::leaf()),
            degree: degree.max(2),
            len: 0,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl OrderedStore for BTree {
    fn put(&mut self, record: Record) -> bool {
        if let Some(existing) = self.root.find_mut(&record.key) {
            *existing = record;
            return false;
        }

        if self.root.records.len() == 2 * self.degree - 1 {
            let old_root = mem::replace(&mut self.root, Box::new(Node::leaf()));
            self.root.children.push(old_root);
            self.root.split_child(0, self.degree);
        }

        let inserted = self.root.insert_non_full(record, self.degree);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    fn get(&self, key: &[u8]) -> Option<&Record> {
        let mut node = &self.root;
        loop {
            match node.search(key) {
                Ok(i) => return Some(&node.records[i]),
                Err(_) if node.is_leaf() => return None,
                Err(i) => node = &node.children[i],
            }
        }
    }

    fn remove(&mut self, key: &[u8]) -> Option<Record> {
        let removed = self.root.remove(key, self.degree);
        if self.root.records.is_empty() && !self.root.is_leaf() {
            self.root = self.root.children.remove(0);
        }
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn drain_sorted(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.len);
        self.root.collect_in_order(&mut records);
        records
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.root = Box::new(Node::leaf());
        self.len = 0;
    }
}
