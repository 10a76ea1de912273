//! Membership filter
//!
//! A Bloom filter answering "definitely absent" or "maybe present". Sized
//! with the closed-form formulas for `n` expected items and a target
//! false-positive probability `p`:
//!
//! ```text
//! m = ceil(-n · ln(p) / ln(2)²)      bits
//! k = ceil((m / n) · ln(2))          hash functions
//! ```
//!
//! Bit `i` of a key is `h_i(key) mod m` where `h_i` is the i-th member of the
//! seeded hash family. Serialized with bincode (bit array + seeds).

use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::hash::{hash_family, SeededHash};

/// Probabilistic set with no false negatives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipFilter {
    /// Bit array, 8 bits per byte
    bits: Vec<u8>,
    /// Number of addressable bits (m)
    num_bits: u64,
    /// One seeded hash per probe (k)
    hashes: Vec<SeededHash>,
}

impl MembershipFilter {
    /// Size a filter for `expected_items` at `false_positive_rate`
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Result<Self> {
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(StrataError::Config(format!(
                "false positive rate must be in (0, 1), got {}",
                false_positive_rate
            )));
        }
        let n = expected_items.max(1) as f64;
        let m = (-n * false_positive_rate.ln() / LN_2.powi(2)).ceil().max(8.0) as u64;
        let k = ((m as f64 / n) * LN_2).ceil().max(1.0) as u32;

        Ok(Self {
            bits: vec![0u8; m.div_ceil(8) as usize],
            num_bits: m,
            hashes: hash_family(k),
        })
    }

    pub fn add(&mut self, key: &[u8]) {
        for i in 0..self.hashes.len() {
            let bit = self.bit_index(i, key);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// `false` means the key was never added
    pub fn has(&self, key: &[u8]) -> bool {
        (0..self.hashes.len()).all(|i| {
            let bit = self.bit_index(i, key);
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    #[inline]
    fn bit_index(&self, i: usize, key: &[u8]) -> u64 {
        self.hashes[i].hash(key) % self.num_bits
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> usize {
        self.hashes.len()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let filter: Self = bincode::deserialize(bytes)?;
        if filter.num_bits == 0
            || filter.bits.len() as u64 != filter.num_bits.div_ceil(8)
            || filter.hashes.is_empty()
        {
            return Err(StrataError::Corruption(format!(
                "inconsistent filter: {} bits in {} bytes, {} hashes",
                filter.num_bits,
                filter.bits.len(),
                filter.hashes.len()
            )));
        }
        Ok(filter)
    }
}
