//! Block and transaction hashing.
//!
//! The proof-of-work hash is chain specific and changes at fork heights, so
//! it is supplied as a [`BlockHasher`] rather than hard-wired. Transaction
//! ids are always double SHA-256 of the raw transaction.

use sha2::{Digest, Sha256};

use crate::types::Hash256;

/// Proof-of-work hash over a serialized header.
///
/// `height` selects the algorithm variant on chains whose hash changed at a
/// fork; implementations for chains without forks ignore it.
pub trait BlockHasher: Send + Sync {
    /// Digest in wire (encodable) order, as stored in compact blocks and in
    /// the next header's `prev_hash`.
    fn encodable_hash(&self, header: &[u8], height: u64) -> Hash256;

    /// Digest in display order, as the node prints it.
    fn display_hash(&self, header: &[u8], height: u64) -> Hash256 {
        self.encodable_hash(header, height).reversed()
    }
}

/// SHA-256 applied twice. Used for transaction ids, and as the block hash on
/// chains that use the Bitcoin/Zcash header hash.
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash256(second.into())
}

/// Header hash of Zcash-derived chains: double SHA-256 of the full header.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleSha256Hasher;

impl BlockHasher for DoubleSha256Hasher {
    fn encodable_hash(&self, header: &[u8], _height: u64) -> Hash256 {
        double_sha256(header)
    }
}

/// Selects a hasher by activation height.
///
/// Each entry applies from its activation height up to the next entry's.
/// Heights below the first activation use the first entry.
pub struct HeightGatedHasher {
    schedule: Vec<(u64, Box<dyn BlockHasher>)>,
}

impl HeightGatedHasher {
    pub fn new(base: Box<dyn BlockHasher>) -> Self {
        Self { schedule: vec![(0, base)] }
    }

    /// Add a variant active from `height` onwards.
    pub fn activate_at(mut self, height: u64, hasher: Box<dyn BlockHasher>) -> Self {
        self.schedule.push((height, hasher));
        self.schedule.sort_by_key(|(h, _)| *h);
        self
    }

    fn select(&self, height: u64) -> &dyn BlockHasher {
        self.schedule
            .iter()
            .rev()
            .find(|(activation, _)| *activation <= height)
            .unwrap_or(&self.schedule[0])
            .1
            .as_ref()
    }
}

impl BlockHasher for HeightGatedHasher {
    fn encodable_hash(&self, header: &[u8], height: u64) -> Hash256 {
        self.select(height).encodable_hash(header, height)
    }
}
