//! Shared fixtures: a scripted node and a sleeper that records instead of
//! waiting.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use lwd_core::error::RpcError;
use lwd_core::hash::double_sha256;
use lwd_core::header::BlockHeader;
use lwd_core::reader::write_compact_size;
use lwd_core::types::Hash256;
use lwd_node_lib::clock::Sleeper;
use lwd_node_lib::node_client::{BlockchainInfo, ConsensusInfo, NodeRpc, RawTransaction, UpgradeInfo};

/// A raw block and its wire-order hash.
#[derive(Clone)]
pub struct RawBlock {
    pub height: u64,
    pub hash: Hash256,
    pub bytes: Vec<u8>,
}

fn height_script(height: u64) -> Vec<u8> {
    let mut bytes = height.to_le_bytes().to_vec();
    while bytes.len() > 1 && bytes[bytes.len() - 1] == 0 && bytes[bytes.len() - 2] & 0x80 == 0 {
        bytes.pop();
    }
    if bytes[bytes.len() - 1] & 0x80 != 0 {
        bytes.push(0);
    }
    let mut script = vec![bytes.len() as u8];
    script.extend_from_slice(&bytes);
    script
}

fn coinbase(height: u64) -> Vec<u8> {
    let script = height_script(height);
    let mut tx = Vec::new();
    tx.extend_from_slice(&1u32.to_le_bytes());
    write_compact_size(&mut tx, 1);
    tx.extend_from_slice(&[0u8; 32]);
    tx.extend_from_slice(&u32::MAX.to_le_bytes());
    write_compact_size(&mut tx, script.len() as u64);
    tx.extend_from_slice(&script);
    tx.extend_from_slice(&u32::MAX.to_le_bytes());
    write_compact_size(&mut tx, 1);
    tx.extend_from_slice(&300_000_000u64.to_le_bytes());
    write_compact_size(&mut tx, 0);
    tx.extend_from_slice(&0u32.to_le_bytes());
    tx
}

/// A v4 transaction with one sapling output.
fn shielded_tx(tag: u8) -> Vec<u8> {
    let mut tx = Vec::new();
    tx.extend_from_slice(&(4u32 | 1 << 31).to_le_bytes());
    tx.extend_from_slice(&0x892F_2085u32.to_le_bytes());
    write_compact_size(&mut tx, 0);
    write_compact_size(&mut tx, 0);
    tx.extend_from_slice(&[0u8; 8]);
    tx.extend_from_slice(&10_000i64.to_le_bytes());
    write_compact_size(&mut tx, 0);
    write_compact_size(&mut tx, 1);
    tx.extend_from_slice(&[tag; 948]);
    write_compact_size(&mut tx, 0);
    tx.extend_from_slice(&[0u8; 64]);
    tx
}

/// Build a block at `height` on top of `prev`. `fork` distinguishes
/// competing blocks at the same height.
pub fn make_block(height: u64, prev: Hash256, fork: u8) -> RawBlock {
    let header = BlockHeader {
        version: 4,
        prev_hash: prev,
        merkle_root: Hash256([fork; 32]),
        final_sapling_root: Hash256::ZERO,
        time: 1_600_000_000 + height as u32 * 60,
        bits: [0xff, 0xff, 0x07, 0x1f],
        nonce: [fork; 32],
        solution: vec![0x5a; 32],
    };
    let header_bytes = header.encode();
    let hash = double_sha256(&header_bytes);

    let mut bytes = header_bytes;
    write_compact_size(&mut bytes, 2);
    bytes.extend_from_slice(&coinbase(height));
    bytes.extend_from_slice(&shielded_tx(fork));
    RawBlock { height, hash, bytes }
}

/// `count` linked blocks starting at `start` on top of `prev`.
pub fn make_chain(start: u64, count: u64, prev: Hash256, fork: u8) -> Vec<RawBlock> {
    let mut out = Vec::new();
    let mut prev = prev;
    for height in start..start + count {
        let block = make_block(height, prev, fork);
        prev = block.hash;
        out.push(block);
    }
    out
}

/// Scripted node. Serves the blocks it holds, answers "not available"
/// above its tip, and can be told to fail the next few calls.
#[derive(Default)]
pub struct StubNode {
    blocks: Mutex<BTreeMap<u64, Vec<u8>>>,
    failures: Mutex<VecDeque<RpcError>>,
    requests: Mutex<Vec<u64>>,
    transactions: Mutex<HashMap<Hash256, RawTransaction>>,
    sent: Mutex<Vec<Vec<u8>>>,
    pub sapling_height: u64,
}

impl StubNode {
    pub fn new(sapling_height: u64) -> Self {
        Self { sapling_height, ..Default::default() }
    }

    pub fn serve(&self, chain: &[RawBlock]) {
        let mut blocks = self.blocks.lock();
        for block in chain {
            blocks.insert(block.height, block.bytes.clone());
        }
    }

    pub fn serve_raw(&self, height: u64, bytes: Vec<u8>) {
        self.blocks.lock().insert(height, bytes);
    }

    pub fn fail_next(&self, error: RpcError, times: usize) {
        let mut failures = self.failures.lock();
        for _ in 0..times {
            failures.push_back(error.clone());
        }
    }

    pub fn requests(&self) -> Vec<u64> {
        self.requests.lock().clone()
    }

    /// Make `data` retrievable by its double-SHA256 txid.
    pub fn serve_tx(&self, data: Vec<u8>, height: u64) -> Hash256 {
        let txid = double_sha256(&data);
        self.transactions.lock().insert(txid, RawTransaction { data, height });
        txid
    }

    /// Transactions relayed so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    fn tip(&self) -> u64 {
        self.blocks.lock().keys().next_back().copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl NodeRpc for StubNode {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        if let Some(e) = self.failures.lock().pop_front() {
            return Err(e);
        }
        let mut upgrades = std::collections::HashMap::new();
        upgrades.insert(
            "76b809bb".to_string(),
            UpgradeInfo { name: "Sapling".into(), activationheight: self.sapling_height },
        );
        Ok(BlockchainInfo {
            chain: "main".into(),
            blocks: self.tip(),
            headers: self.tip(),
            upgrades,
            consensus: ConsensusInfo { chaintip: "76b809bb".into(), nextblock: "76b809bb".into() },
        })
    }

    async fn get_block(&self, height: u64) -> Result<Option<Vec<u8>>, RpcError> {
        self.requests.lock().push(height);
        if let Some(e) = self.failures.lock().pop_front() {
            return Err(e);
        }
        Ok(self.blocks.lock().get(&height).cloned())
    }

    async fn get_raw_transaction(&self, txid: &Hash256) -> Result<RawTransaction, RpcError> {
        if let Some(e) = self.failures.lock().pop_front() {
            return Err(e);
        }
        self.transactions.lock().get(txid).cloned().ok_or_else(|| RpcError::Call {
            code: -5,
            message: "No information available about transaction".into(),
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
        if let Some(e) = self.failures.lock().pop_front() {
            return Err(e);
        }
        self.sent.lock().push(raw.to_vec());
        Ok(double_sha256(raw).to_display_hex())
    }
}

/// Records each requested sleep and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
