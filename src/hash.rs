//! Seeded hash family
//!
//! Each member is BLAKE3 in keyed mode with a distinct 32-byte seed. Seeds are
//! derived from their position in the family, so a family of `k` members is
//! the same in every process and can be rebuilt from the seeds alone.

use serde::{Deserialize, Serialize};

const SEED_CONTEXT: &[u8] = b"stratakv seeded hash v1";

/// One keyed hash function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeededHash {
    seed: [u8; 32],
}

impl SeededHash {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    /// Deterministic seed for family member `index`
    pub fn for_index(index: u32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SEED_CONTEXT);
        hasher.update(&index.to_le_bytes());
        Self {
            seed: *hasher.finalize().as_bytes(),
        }
    }

    /// 64-bit digest of `data` under this seed
    pub fn hash(&self, data: &[u8]) -> u64 {
        let digest = blake3::keyed_hash(&self.seed, data);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }
}

/// `count` independent seeded hashes
pub fn hash_family(count: u32) -> Vec<SeededHash> {
    (0..count).map(SeededHash::for_index).collect()
}
