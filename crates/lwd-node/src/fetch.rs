//! Fetch one block from the node and reduce it to a compact block.

use tracing::warn;

use lwd_core::block::Block;
use lwd_core::compact::CompactBlock;
use lwd_core::error::{FetchError, ParseError};
use lwd_core::hash::BlockHasher;

use crate::node_client::NodeRpc;

/// Fetch and decode the block at `height`. `Ok(None)` means the node has
/// no block there yet.
///
/// The requested height is authoritative for the compact block. A coinbase
/// height that disagrees is logged, or rejected when `strict_height` is set.
pub async fn fetch_compact_block(
    rpc: &dyn NodeRpc,
    hasher: &dyn BlockHasher,
    height: u64,
    strict_height: bool,
) -> Result<Option<CompactBlock>, FetchError> {
    let Some(raw) = rpc.get_block(height).await? else {
        return Ok(None);
    };
    let block = Block::decode(&raw)?;
    let coinbase_height = block.height().ok_or(ParseError::UnknownHeight)?;
    if coinbase_height != height {
        if strict_height {
            return Err(FetchError::UnexpectedHeight { requested: height, got: coinbase_height });
        }
        warn!(height, coinbase_height, "coinbase height differs from requested height");
    }
    Ok(Some(block.to_compact_at(hasher, height)))
}

/// Check that `hasher` reproduces the node's header hashes: the block at
/// `height + 1` must name the hash of the block at `height` as its parent.
/// `Ok(None)` means the node does not have both blocks yet.
pub async fn check_block_hasher(
    rpc: &dyn NodeRpc,
    hasher: &dyn BlockHasher,
    height: u64,
) -> Result<Option<bool>, FetchError> {
    let Some(parent) = fetch_compact_block(rpc, hasher, height, false).await? else {
        return Ok(None);
    };
    let Some(child) = fetch_compact_block(rpc, hasher, height + 1, false).await? else {
        return Ok(None);
    };
    Ok(Some(child.prev_block_hash() == parent.block_hash()))
}
