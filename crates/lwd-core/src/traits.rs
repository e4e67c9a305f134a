//! Storage interfaces shared between the ingestor and the query path.
//!
//! - [`BlockCache`]: the authoritative contiguous window of compact blocks
//! - [`BlockMirror`]: a best-effort secondary copy fed after each append

use crate::compact::CompactBlock;
use crate::error::{CacheError, MirrorError};
use crate::types::Hash256;

/// Height-indexed store holding the contiguous window
/// `[first_height, next_height)`.
///
/// Mutations come from a single writer, one height at a time; reads may run
/// concurrently from any number of tasks.
pub trait BlockCache: Send + Sync {
    /// Append the block at `next_height`. Any other height is rejected with
    /// [`CacheError::NonConsecutiveAdd`].
    fn add(&self, block: &CompactBlock) -> Result<(), CacheError>;

    /// Drop every block at or above `height`, clamped to the window start.
    /// Returns the new `next_height`.
    fn reorg(&self, height: u64) -> Result<u64, CacheError>;

    /// The block at `height`, or `None` outside the window.
    fn get(&self, height: u64) -> Result<Option<CompactBlock>, CacheError>;

    /// Height of the newest block, or `None` when empty.
    fn latest_height(&self) -> Option<u64>;

    /// Height the next `add` must carry.
    fn next_height(&self) -> u64;

    /// Lowest height held, or that the first add will carry.
    fn first_height(&self) -> u64;

    /// Wire-order hash of the newest block, or `None` when empty.
    fn latest_hash(&self) -> Option<Hash256>;

    /// Flush pending writes to durable storage.
    fn sync(&self) -> Result<(), CacheError> {
        Ok(())
    }

    /// Whether a block claiming `prev_hash` as parent fails to link to the
    /// newest cached block. An empty cache links to anything.
    fn hash_mismatch(&self, prev_hash: &Hash256) -> bool {
        self.latest_hash().is_some_and(|latest| latest != *prev_hash)
    }
}

/// Secondary store receiving a copy of the cache's mutations.
///
/// Mirrors are updated off the ingest path; an error is logged and otherwise
/// ignored.
pub trait BlockMirror: Send + Sync {
    fn name(&self) -> &str;

    fn mirror_add(&self, block: &CompactBlock) -> Result<(), MirrorError>;

    /// Discard mirrored blocks at or above `height`.
    fn mirror_reorg(&self, height: u64) -> Result<(), MirrorError>;
}
