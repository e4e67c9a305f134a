//! JSON-RPC server for light wallet clients.
//!
//! Uses jsonrpsee 0.24 to expose the query façade. Compact blocks are
//! returned as hex-encoded protobuf alongside a few decoded fields.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use prost::Message;
use serde::{Deserialize, Serialize};

use lwd_core::compact::CompactBlock;
use lwd_core::constants::RPC_INVALID_PARAMETER;
use lwd_core::error::{LwdError, QueryError};

use crate::node_client::RawTransaction;
use crate::service::{BlockId, BlockService, LightdInfo, SendResponse, TxFilter};

/// Largest range a single `getblockrange` call may return.
pub const MAX_RANGE_BLOCKS: u64 = 1_000;

/// JSON representation of the cache tip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestBlockJson {
    pub height: u64,
    /// Block hash, display order.
    pub hash: String,
}

/// JSON representation of a compact block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactBlockJson {
    pub height: u64,
    /// Block hash, display order.
    pub hash: String,
    /// Previous block hash, display order.
    pub prev_hash: String,
    pub time: u32,
    /// Transactions with shielded components.
    pub tx_count: usize,
    /// The protobuf-encoded compact block as hex.
    pub data: String,
}

impl From<&CompactBlock> for CompactBlockJson {
    fn from(block: &CompactBlock) -> Self {
        Self {
            height: block.height,
            hash: block.block_hash().map(|h| h.to_display_hex()).unwrap_or_default(),
            prev_hash: block.prev_block_hash().map(|h| h.to_display_hex()).unwrap_or_default(),
            time: block.time,
            tx_count: block.vtx.len(),
            data: hex::encode(block.encode_to_vec()),
        }
    }
}

/// JSON representation of a raw transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransactionJson {
    /// Serialized transaction as hex.
    pub data: String,
    pub height: u64,
}

impl From<RawTransaction> for RawTransactionJson {
    fn from(tx: RawTransaction) -> Self {
        Self { data: hex::encode(tx.data), height: tx.height }
    }
}

#[rpc(server)]
pub trait LightwalletRpc {
    /// Height and hash of the newest cached block.
    #[method(name = "getlatestblock")]
    async fn get_latest_block(&self) -> Result<LatestBlockJson, ErrorObjectOwned>;

    /// A compact block by height, or by hash (not supported).
    #[method(name = "getblock")]
    async fn get_block(&self, id: BlockId) -> Result<CompactBlockJson, ErrorObjectOwned>;

    /// Compact blocks from `start` to `end` inclusive.
    #[method(name = "getblockrange")]
    async fn get_block_range(&self, start: u64, end: u64) -> Result<Vec<CompactBlockJson>, ErrorObjectOwned>;

    /// Service and chain description.
    #[method(name = "getlightdinfo")]
    async fn get_lightd_info(&self) -> Result<LightdInfo, ErrorObjectOwned>;

    /// A transaction by txid, from the node.
    #[method(name = "gettransaction")]
    async fn get_transaction(&self, filter: TxFilter) -> Result<RawTransactionJson, ErrorObjectOwned>;

    /// Relay a hex-encoded transaction to the node.
    #[method(name = "sendtransaction")]
    async fn send_transaction(&self, data: String) -> Result<SendResponse, ErrorObjectOwned>;
}

pub struct RpcServerImpl {
    service: Arc<BlockService>,
}

impl RpcServerImpl {
    pub fn new(service: Arc<BlockService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LightwalletRpcServer for RpcServerImpl {
    async fn get_latest_block(&self) -> Result<LatestBlockJson, ErrorObjectOwned> {
        let (height, hash) = self.service.get_latest_block().map_err(query_error)?;
        Ok(LatestBlockJson { height, hash: hash.to_display_hex() })
    }

    async fn get_block(&self, id: BlockId) -> Result<CompactBlockJson, ErrorObjectOwned> {
        let block = self.service.get_block_by_id(&id).await.map_err(query_error)?;
        Ok(CompactBlockJson::from(&block))
    }

    async fn get_block_range(&self, start: u64, end: u64) -> Result<Vec<CompactBlockJson>, ErrorObjectOwned> {
        let requested = start.abs_diff(end) + 1;
        if requested > MAX_RANGE_BLOCKS {
            return Err(query_error(QueryError::RangeTooLarge { requested, limit: MAX_RANGE_BLOCKS }));
        }
        let blocks = self
            .service
            .get_block_range(start, end)
            .collect()
            .await
            .map_err(query_error)?;
        Ok(blocks.iter().map(CompactBlockJson::from).collect())
    }

    async fn get_lightd_info(&self) -> Result<LightdInfo, ErrorObjectOwned> {
        self.service.get_lightd_info().await.map_err(query_error)
    }

    async fn get_transaction(&self, filter: TxFilter) -> Result<RawTransactionJson, ErrorObjectOwned> {
        let tx = self.service.get_transaction(&filter).await.map_err(query_error)?;
        Ok(tx.into())
    }

    async fn send_transaction(&self, data: String) -> Result<SendResponse, ErrorObjectOwned> {
        let raw = hex::decode(data.trim())
            .map_err(|e| query_error(QueryError::InvalidArgument(format!("transaction hex: {e}"))))?;
        self.service.send_transaction(&raw).await.map_err(query_error)
    }
}

fn query_error(e: QueryError) -> ErrorObjectOwned {
    let code = match e {
        QueryError::NewerThanLatest
        | QueryError::Unspecified
        | QueryError::RangeTooLarge { .. }
        | QueryError::TxidRequired
        | QueryError::TxByBlockUnsupported
        | QueryError::InvalidArgument(_) => RPC_INVALID_PARAMETER,
        _ => -1,
    };
    ErrorObjectOwned::owned(code, e.to_string(), None::<()>)
}

/// Bind and start the JSON-RPC server.
pub async fn start_rpc_server(addr: &str, service: Arc<BlockService>) -> Result<ServerHandle, LwdError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| LwdError::Server(format!("RPC server error: {e}")))?;

    let handle = server.start(RpcServerImpl::new(service).into_rpc());
    Ok(handle)
}
