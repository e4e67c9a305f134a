//! Query façade over the block cache.
//!
//! Reads go to the hot in-memory mirror while it is in step with the
//! persistent cache, then the persistent cache, then the node itself for
//! heights outside the cached window.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use lwd_core::compact::CompactBlock;
use lwd_core::error::{QueryError, RpcError};
use lwd_core::hash::BlockHasher;
use lwd_core::traits::BlockCache;
use lwd_core::types::Hash256;

use crate::fetch::fetch_compact_block;
use crate::node_client::{NodeRpc, RawTransaction};

/// Blocks buffered between a range producer and its consumer.
const RANGE_QUEUE_DEPTH: usize = 64;

/// Selects a block by height or hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockId {
    #[serde(default)]
    pub height: u64,
    /// Display-order hash as hex.
    #[serde(default)]
    pub hash: Option<String>,
}

/// Selects a transaction. Only `hash` (display-order txid) is supported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFilter {
    #[serde(default)]
    pub block: Option<BlockId>,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Outcome of a submitted transaction: code 0 and the txid on success,
/// otherwise the node's error code and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub error_code: i32,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightdInfo {
    pub version: String,
    pub vendor: String,
    pub taddr_support: bool,
    pub chain_name: String,
    pub sapling_activation_height: u64,
    pub consensus_branch_id: String,
    pub block_height: u64,
}

pub struct BlockService {
    cache: Arc<dyn BlockCache>,
    hot: Option<Arc<dyn BlockCache>>,
    rpc: Arc<dyn NodeRpc>,
    hasher: Arc<dyn BlockHasher>,
    request_timeout: Duration,
    strict_height: bool,
}

impl BlockService {
    pub fn new(cache: Arc<dyn BlockCache>, rpc: Arc<dyn NodeRpc>, hasher: Arc<dyn BlockHasher>) -> Self {
        Self {
            cache,
            hot: None,
            rpc,
            hasher,
            request_timeout: Duration::from_secs(30),
            strict_height: false,
        }
    }

    /// Serve reads from `hot` before the persistent cache.
    pub fn with_hot_cache(mut self, hot: Arc<dyn BlockCache>) -> Self {
        self.hot = Some(hot);
        self
    }

    /// Bound on each block lookup within a range query.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_strict_height(mut self, strict: bool) -> Self {
        self.strict_height = strict;
        self
    }

    pub fn get_latest_height(&self) -> Result<u64, QueryError> {
        self.cache.latest_height().ok_or(QueryError::CacheEmpty)
    }

    /// Height and wire-order hash of the cache tip.
    pub fn get_latest_block(&self) -> Result<(u64, Hash256), QueryError> {
        let height = self.get_latest_height()?;
        let hash = self.cache.latest_hash().ok_or(QueryError::CacheEmpty)?;
        Ok((height, hash))
    }

    pub async fn get_block(&self, height: u64) -> Result<CompactBlock, QueryError> {
        if let Some(block) = self.hot_block(height)? {
            return Ok(block);
        }
        if let Some(block) = self.cache.get(height)? {
            return Ok(block);
        }
        debug!(height, "block not cached, asking node");
        fetch_compact_block(self.rpc.as_ref(), self.hasher.as_ref(), height, self.strict_height)
            .await?
            .ok_or(QueryError::NewerThanLatest)
    }

    /// A block from the hot mirror, served only while the mirror ends at the
    /// same tip as the cache. The mirror window is hash-linked, so a shared
    /// tip means every block in it is also the cache's block.
    fn hot_block(&self, height: u64) -> Result<Option<CompactBlock>, QueryError> {
        let Some(hot) = &self.hot else {
            return Ok(None);
        };
        let Some(block) = hot.get(height)? else {
            return Ok(None);
        };
        let in_step = hot.latest_hash().is_some()
            && hot.latest_hash() == self.cache.latest_hash()
            && hot.latest_height() == self.cache.latest_height();
        if !in_step {
            debug!(height, "hot cache behind block cache, reading files");
            return Ok(None);
        }
        Ok(Some(block))
    }

    pub async fn get_block_by_id(&self, id: &BlockId) -> Result<CompactBlock, QueryError> {
        if id.hash.as_deref().is_some_and(|h| !h.is_empty()) {
            return Err(QueryError::HashUnsupported);
        }
        if id.height == 0 {
            return Err(QueryError::Unspecified);
        }
        self.get_block(id.height).await
    }

    /// Stream the blocks from `start` to `end` inclusive. A range with
    /// `start > end` is served in descending order.
    pub fn get_block_range(self: &Arc<Self>, start: u64, end: u64) -> BlockRange {
        let (blocks_tx, blocks_rx) = mpsc::channel(RANGE_QUEUE_DEPTH);
        let (done_tx, done_rx) = oneshot::channel();
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let heights: Box<dyn Iterator<Item = u64> + Send> = if start <= end {
                Box::new(start..=end)
            } else {
                Box::new((end..=start).rev())
            };
            let mut outcome = Ok(());
            for height in heights {
                let block = match tokio::time::timeout(service.request_timeout, service.get_block(height)).await {
                    Ok(Ok(block)) => block,
                    Ok(Err(e)) => {
                        outcome = Err(e);
                        break;
                    }
                    Err(_) => {
                        outcome = Err(QueryError::Timeout(service.request_timeout));
                        break;
                    }
                };
                if blocks_tx.send(block).await.is_err() {
                    debug!(height, "range consumer went away");
                    return;
                }
            }
            let _ = done_tx.send(outcome);
        });

        BlockRange { blocks: blocks_rx, done: Some(done_rx) }
    }

    /// A transaction fetched from the node by txid.
    pub async fn get_transaction(&self, filter: &TxFilter) -> Result<RawTransaction, QueryError> {
        match (filter.hash.as_deref(), &filter.block) {
            (Some(hash), _) if !hash.is_empty() => {
                let txid = Hash256::from_display_hex(hash)
                    .map_err(|e| QueryError::InvalidArgument(format!("txid: {e}")))?;
                Ok(self.rpc.get_raw_transaction(&txid).await?)
            }
            (_, Some(block)) if block.hash.as_deref().is_some_and(|h| !h.is_empty()) => {
                Err(QueryError::TxByBlockUnsupported)
            }
            _ => Err(QueryError::TxidRequired),
        }
    }

    /// Forward a serialized transaction to the node. Rejections by the node
    /// are reported in the response, not as errors.
    pub async fn send_transaction(&self, raw: &[u8]) -> Result<SendResponse, QueryError> {
        match self.rpc.send_raw_transaction(raw).await {
            Ok(txid) => Ok(SendResponse { error_code: 0, error_message: txid }),
            Err(RpcError::Call { code, message }) => {
                debug!(code, "node rejected transaction: {message}");
                Ok(SendResponse { error_code: code, error_message: message })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Service and chain description, with a fresh block height from the node.
    pub async fn get_lightd_info(&self) -> Result<LightdInfo, QueryError> {
        let info = self.rpc.get_blockchain_info().await?;
        Ok(LightdInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            vendor: "Verus lightwalletd".to_string(),
            taddr_support: true,
            chain_name: info.chain.clone(),
            sapling_activation_height: info.sapling_activation_height(),
            consensus_branch_id: info.consensus_branch_id().to_string(),
            block_height: info.blocks,
        })
    }
}

/// Blocks of a range query, in request order, followed by at most one error.
pub struct BlockRange {
    blocks: mpsc::Receiver<CompactBlock>,
    done: Option<oneshot::Receiver<Result<(), QueryError>>>,
}

impl BlockRange {
    /// The next block, the producer's error, or `None` once the range is
    /// complete.
    pub async fn next(&mut self) -> Option<Result<CompactBlock, QueryError>> {
        if let Some(block) = self.blocks.recv().await {
            return Some(Ok(block));
        }
        match self.done.take()?.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(Err(e)),
            Err(_) => Some(Err(QueryError::ProducerGone)),
        }
    }

    pub async fn collect(mut self) -> Result<Vec<CompactBlock>, QueryError> {
        let mut out = Vec::new();
        while let Some(block) = self.next().await {
            out.push(block?);
        }
        Ok(out)
    }
}
