//! JSON-RPC client for the full node.
//!
//! Calls used: `getblockchaininfo` at startup and for `getlightdinfo`,
//! `getblock <height> 0` for raw blocks, and `getrawtransaction` /
//! `sendrawtransaction` passed through for wallets.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use lwd_core::constants::SAPLING_BRANCH_ID;
use lwd_core::error::{IngestError, RpcError};
use lwd_core::types::Hash256;

use crate::clock::Sleeper;

/// Startup retries of `getblockchaininfo` before giving up.
pub const CHAIN_INFO_MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpgradeInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub activationheight: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConsensusInfo {
    #[serde(default)]
    pub chaintip: String,
    #[serde(default)]
    pub nextblock: String,
}

/// The subset of `getblockchaininfo` the service needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    #[serde(default)]
    pub blocks: u64,
    #[serde(default)]
    pub headers: u64,
    #[serde(default)]
    pub upgrades: HashMap<String, UpgradeInfo>,
    #[serde(default)]
    pub consensus: ConsensusInfo,
}

/// A transaction as the node returns it, with the height of the block that
/// mined it (0 while in the mempool).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawTransaction {
    pub data: Vec<u8>,
    pub height: u64,
}

/// Verbose `getrawtransaction` result; only the fields we keep.
#[derive(Deserialize)]
struct VerboseTransaction {
    hex: String,
    #[serde(default)]
    height: u64,
}

impl BlockchainInfo {
    /// Activation height of the Sapling upgrade, or 0 if the node does not
    /// report one.
    pub fn sapling_activation_height(&self) -> u64 {
        self.upgrades
            .get(SAPLING_BRANCH_ID)
            .map(|u| u.activationheight)
            .unwrap_or(0)
    }

    /// Consensus branch id for the next block.
    pub fn consensus_branch_id(&self) -> &str {
        &self.consensus.nextblock
    }
}

#[async_trait::async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError>;

    /// Raw serialized block at `height`, or `None` if the node has no block
    /// there yet.
    async fn get_block(&self, height: u64) -> Result<Option<Vec<u8>>, RpcError>;

    /// A transaction by wire-order txid.
    async fn get_raw_transaction(&self, txid: &Hash256) -> Result<RawTransaction, RpcError>;

    /// Submit a serialized transaction. Returns the txid the node reports,
    /// display order hex.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError>;
}

/// [`NodeRpc`] over HTTP POST.
pub struct ReqwestNode {
    client: Client,
    endpoint: String,
    credentials: Option<(String, Option<String>)>,
}

impl ReqwestNode {
    pub fn new(
        endpoint: &str,
        user: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            credentials: user.map(|u| (u, password)),
        })
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "lightwalletd",
            "method": method,
            "params": params,
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        // Errors arrive with a non-2xx status and a JSON body; read it anyway.
        let response = request.send().await.map_err(|e| RpcError::Transport(e.to_string()))?;
        let status = response.status();
        let resp: Value = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(format!("HTTP {status}: {e}")))?;

        if let Some(err) = resp.get("error").filter(|e| !e.is_null()) {
            return Err(call_error(err));
        }
        let result = resp.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))
    }
}

fn call_error(err: &Value) -> RpcError {
    let code = err
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|c| i32::try_from(c).ok())
        .unwrap_or_default();
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| err.to_string());
    RpcError::Call { code, message }
}

#[async_trait::async_trait]
impl NodeRpc for ReqwestNode {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.call("getblockchaininfo", json!([])).await
    }

    async fn get_block(&self, height: u64) -> Result<Option<Vec<u8>>, RpcError> {
        let raw: String = match self.call("getblock", json!([height.to_string(), 0])).await {
            Ok(raw) => raw,
            Err(e) if e.is_height_unavailable() => return Ok(None),
            Err(e) => return Err(e),
        };
        hex::decode(raw.trim())
            .map(Some)
            .map_err(|e| RpcError::InvalidResponse(format!("getblock {height}: {e}")))
    }

    async fn get_raw_transaction(&self, txid: &Hash256) -> Result<RawTransaction, RpcError> {
        let tx: VerboseTransaction = self
            .call("getrawtransaction", json!([txid.to_display_hex(), 1]))
            .await?;
        let data = hex::decode(tx.hex.trim())
            .map_err(|e| RpcError::InvalidResponse(format!("getrawtransaction {txid}: {e}")))?;
        Ok(RawTransaction { data, height: tx.height })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
        self.call("sendrawtransaction", json!([hex::encode(raw)])).await
    }
}

/// Query `getblockchaininfo`, retrying with a growing pause until it
/// answers.
pub async fn get_chain_info_with_retry(
    rpc: &dyn NodeRpc,
    sleeper: &dyn Sleeper,
) -> Result<BlockchainInfo, IngestError> {
    let mut retry = 0u32;
    loop {
        match rpc.get_blockchain_info().await {
            Ok(info) => {
                info!(
                    chain = %info.chain,
                    sapling = info.sapling_activation_height(),
                    height = info.blocks,
                    branch = %info.consensus_branch_id(),
                    "got chain parameters"
                );
                return Ok(info);
            }
            Err(e) => {
                retry += 1;
                if retry > CHAIN_INFO_MAX_RETRIES {
                    return Err(IngestError::RetriesExhausted {
                        method: "getblockchaininfo",
                        retries: CHAIN_INFO_MAX_RETRIES,
                    });
                }
                let pause = Duration::from_secs(10 + 5 * u64::from(retry));
                warn!(retry, ?pause, "error getting chain info, retrying: {e}");
                sleeper.sleep(pause).await;
            }
        }
    }
}
