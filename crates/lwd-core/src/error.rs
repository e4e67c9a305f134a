//! Error types for block decoding, caching, node access, and queries.
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("could not read {field}: need {needed} bytes, have {available}")] UnexpectedEof { field: &'static str, needed: usize, available: usize },
    #[error("non-canonical compact size reading {0}")] NonCanonicalCompactSize(&'static str),
    #[error("compact size {size} too large reading {field}")] CompactSizeTooLarge { field: &'static str, size: u64 },
    #[error("unsupported transaction version {version} (overwintered: {overwintered})")] UnsupportedTxVersion { version: u32, overwintered: bool },
    #[error("version group id {actual:#010x} invalid for v{version} transaction")] InvalidVersionGroup { version: u32, actual: u32 },
    #[error("parsing transaction {index}: {source}")] Transaction { index: usize, source: Box<ParseError> },
    #[error("received overlong message: {0} trailing bytes")] Overlong(usize),
    #[error("coinbase script does not encode a height")] UnknownHeight,
    #[error("hash must be 32 bytes, got {0}")] InvalidHashLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("non-consecutive add: expected height {expected}, got {got}")] NonConsecutiveAdd { expected: u64, got: u64 },
    #[error("reorg to {height} is ahead of next height {next}")] ReorgAheadOfTip { height: u64, next: u64 },
    #[error("block at {height} has no valid hash")] MissingHash { height: u64 },
    #[error("block of {0} bytes does not fit the length index")] BlockTooLarge(usize),
    #[error("corrupt cache: {0}")] Corrupt(String),
    #[error("cache io: {0}")] Io(#[from] std::io::Error),
    #[error("cache decode: {0}")] Decode(#[from] prost::DecodeError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("rpc error {code}: {message}")] Call { code: i32, message: String },
    #[error("rpc transport: {0}")] Transport(String),
    #[error("rpc response: {0}")] InvalidResponse(String),
}

impl RpcError {
    /// The node has no block at the requested height yet.
    pub fn is_height_unavailable(&self) -> bool {
        matches!(self, Self::Call { code, .. } if *code == crate::constants::RPC_INVALID_PARAMETER)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("error requesting block: {0}")] Rpc(#[from] RpcError),
    #[error("error parsing block: {0}")] Parse(#[from] ParseError),
    #[error("received block for height {got}, requested {requested}")] UnexpectedHeight { requested: u64, got: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("mirror {mirror}: {reason}")] Rejected { mirror: String, reason: String },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unable to issue {method} to node after {retries} retries")] RetriesExhausted { method: &'static str, retries: u32 },
    #[error("reorg exceeded max of {0} blocks")] ReorgLimit(u32),
    #[error("cache: {0}")] Cache(#[from] CacheError),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("request for unspecified identifier")] Unspecified,
    #[error("GetBlock by Hash is not yet implemented")] HashUnsupported,
    #[error("Please call GetTransaction with txid")] TxidRequired,
    #[error("Can't GetTransaction with a blockhash+num. Please call GetTransaction with txid")] TxByBlockUnsupported,
    #[error("invalid argument: {0}")] InvalidArgument(String),
    #[error("block requested is newer than latest block")] NewerThanLatest,
    #[error("Cache is empty. Server is probably not yet ready")] CacheEmpty,
    #[error("range of {requested} blocks exceeds limit of {limit}")] RangeTooLarge { requested: u64, limit: u64 },
    #[error("request timed out after {0:?}")] Timeout(Duration),
    #[error("range producer stopped without a result")] ProducerGone,
    #[error(transparent)] Fetch(#[from] FetchError),
    #[error(transparent)] Rpc(#[from] RpcError),
    #[error(transparent)] Cache(#[from] CacheError),
}

#[derive(Error, Debug)]
pub enum LwdError {
    #[error(transparent)] Parse(#[from] ParseError),
    #[error(transparent)] Cache(#[from] CacheError),
    #[error(transparent)] Rpc(#[from] RpcError),
    #[error(transparent)] Ingest(#[from] IngestError),
    #[error(transparent)] Query(#[from] QueryError),
    #[error("config: {0}")] Config(String),
    #[error("server: {0}")] Server(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_unavailable_only_for_invalid_parameter() {
        let not_yet = RpcError::Call { code: -8, message: "Block height out of range".into() };
        assert!(not_yet.is_height_unavailable());

        let other = RpcError::Call { code: -5, message: "Block not found".into() };
        assert!(!other.is_height_unavailable());
        assert!(!RpcError::Transport("connection refused".into()).is_height_unavailable());
    }

    #[test]
    fn overlong_message_wording() {
        assert_eq!(ParseError::Overlong(3).to_string(), "received overlong message: 3 trailing bytes");
    }

    #[test]
    fn query_errors_keep_client_wording() {
        assert_eq!(QueryError::NewerThanLatest.to_string(), "block requested is newer than latest block");
        assert_eq!(QueryError::Unspecified.to_string(), "request for unspecified identifier");
    }
}
