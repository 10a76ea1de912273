//! Integrity tree
//!
//! A BLAKE3 hash tree over fixed-size chunks of a run's data segment.
//!
//! ```text
//!                 root = H(h01 ‖ h22)
//!                /                   \
//!        h01 = H(h0 ‖ h1)      h22 = H(h2 ‖ h2)     ← odd level: last node paired with itself
//!         /        \             /        \
//!       h0          h1         h2        (h2)
//!       │           │          │
//!   chunk 0     chunk 1     chunk 2 (may be short)
//! ```
//!
//! Nodes live in an arena and refer to their children by index. The tree is
//! persisted in pre-order with `None` marking an absent child, wrapped with
//! the chunk size and leaf count so a reader can re-derive and compare it.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

pub type NodeHash = [u8; 32];

#[derive(Debug, Clone)]
struct TreeNode {
    hash: NodeHash,
    left: Option<usize>,
    right: Option<usize>,
}

/// On-disk form of an [`IntegrityTree`]
#[derive(Serialize, Deserialize)]
struct StoredTree {
    chunk_size: u64,
    leaf_count: u64,
    /// Pre-order walk, `None` for an absent child
    nodes: Vec<Option<NodeHash>>,
}

/// Hash tree over the chunks of a data segment
#[derive(Debug, Clone)]
pub struct IntegrityTree {
    nodes: Vec<TreeNode>,
    root: Option<usize>,
    leaf_count: usize,
    chunk_size: usize,
}

fn hash_pair(left: &NodeHash, right: &NodeHash) -> NodeHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

impl IntegrityTree {
    /// Build the tree bottom-up from leaf hashes
    pub fn from_leaves(leaves: Vec<NodeHash>, chunk_size: usize) -> Self {
        let leaf_count = leaves.len();
        let mut nodes: Vec<TreeNode> = leaves
            .into_iter()
            .map(|hash| TreeNode {
                hash,
                left: None,
                right: None,
            })
            .collect();

        let mut level: Vec<usize> = (0..nodes.len()).collect();
        while level.len() > 1 {
            let mut parents = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = *pair.get(1).unwrap_or(&left);
                let hash = hash_pair(&nodes[left].hash, &nodes[right].hash);
                nodes.push(TreeNode {
                    hash,
                    left: Some(left),
                    right: Some(right),
                });
                parents.push(nodes.len() - 1);
            }
            level = parents;
        }

        Self {
            root: level.first().copied(),
            nodes,
            leaf_count,
            chunk_size,
        }
    }

    /// Build the tree over an in-memory buffer
    pub fn build(data: &[u8], chunk_size: usize) -> Self {
        let mut builder = IntegrityTreeBuilder::new(chunk_size);
        builder.update(data);
        builder.finish()
    }

    pub fn root_hash(&self) -> Option<NodeHash> {
        self.root.map(|i| self.nodes[i].hash)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Leaf hashes, left to right, without the duplicated padding
    pub fn leaf_hashes(&self) -> Vec<NodeHash> {
        let mut leaves = Vec::with_capacity(self.leaf_count);
        if let Some(root) = self.root {
            self.collect_leaves(root, &mut leaves);
        }
        leaves.truncate(self.leaf_count);
        leaves
    }

    fn collect_leaves(&self, index: usize, out: &mut Vec<NodeHash>) {
        if out.len() >= self.leaf_count {
            return;
        }
        let node = &self.nodes[index];
        match (node.left, node.right) {
            (None, None) => out.push(node.hash),
            (left, right) => {
                for child in [left, right].into_iter().flatten() {
                    self.collect_leaves(child, out);
                }
            }
        }
    }

    /// Indices of the chunks whose hashes differ between two trees.
    /// Chunks present in only one of the trees count as differing.
    pub fn differing_chunks(&self, other: &IntegrityTree) -> Vec<usize> {
        if self.root_hash() == other.root_hash() && self.leaf_count == other.leaf_count {
            return Vec::new();
        }
        let ours = self.leaf_hashes();
        let theirs = other.leaf_hashes();
        (0..ours.len().max(theirs.len()))
            .filter(|&i| ours.get(i) != theirs.get(i))
            .collect()
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut nodes = Vec::with_capacity(self.nodes.len() * 2 + 1);
        self.write_preorder(self.root, &mut nodes);
        let stored = StoredTree {
            chunk_size: self.chunk_size as u64,
            leaf_count: self.leaf_count as u64,
            nodes,
        };
        Ok(bincode::serialize(&stored)?)
    }

    fn write_preorder(&self, index: Option<usize>, out: &mut Vec<Option<NodeHash>>) {
        match index {
            None => out.push(None),
            Some(i) => {
                let node = &self.nodes[i];
                out.push(Some(node.hash));
                self.write_preorder(node.left, out);
                self.write_preorder(node.right, out);
            }
        }
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let stored: StoredTree = bincode::deserialize(bytes)?;
        let mut tree = Self {
            nodes: Vec::with_capacity(stored.nodes.len() / 2 + 1),
            root: None,
            leaf_count: stored.leaf_count as usize,
            chunk_size: stored.chunk_size as usize,
        };

        let mut cursor = 0;
        tree.root = tree.read_preorder(&stored.nodes, &mut cursor)?;
        if cursor != stored.nodes.len() {
            return Err(StrataError::Corruption(format!(
                "integrity tree has {} trailing nodes",
                stored.nodes.len() - cursor
            )));
        }
        if tree.leaf_hashes().len() != tree.leaf_count {
            return Err(StrataError::Corruption(format!(
                "integrity tree declares {} leaves but holds fewer",
                tree.leaf_count
            )));
        }
        Ok(tree)
    }

    fn read_preorder(
        &mut self,
        stored: &[Option<NodeHash>],
        cursor: &mut usize,
    ) -> Result<Option<usize>> {
        let slot = stored.get(*cursor).ok_or_else(|| {
            StrataError::Corruption("integrity tree ends mid-node".to_string())
        })?;
        *cursor += 1;

        let hash = match slot {
            None => return Ok(None),
            Some(hash) => *hash,
        };
        let index = self.nodes.len();
        self.nodes.push(TreeNode {
            hash,
            left: None,
            right: None,
        });
        let left = self.read_preorder(stored, cursor)?;
        let right = self.read_preorder(stored, cursor)?;
        self.nodes[index].left = left;
        self.nodes[index].right = right;
        Ok(Some(index))
    }
}

// =============================================================================
// Streaming Builder
// =============================================================================

/// Hashes chunks as bytes arrive, so the data segment is never held in memory
pub struct IntegrityTreeBuilder {
    chunk_size: usize,
    pending: Vec<u8>,
    leaves: Vec<NodeHash>,
}

impl IntegrityTreeBuilder {
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            pending: Vec::with_capacity(chunk_size),
            leaves: Vec::new(),
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (self.chunk_size - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() == self.chunk_size {
                self.leaves.push(*blake3::hash(&self.pending).as_bytes());
                self.pending.clear();
            }
        }
    }

    /// Hash the short final chunk, if any, and assemble the tree
    pub fn finish(mut self) -> IntegrityTree {
        if !self.pending.is_empty() {
            self.leaves.push(*blake3::hash(&self.pending).as_bytes());
        }
        IntegrityTree::from_leaves(self.leaves, self.chunk_size)
    }
}
