//! Service configuration.
//!
//! [`ServiceConfig`] carries defaults for every field. [`ServiceConfig::load`]
//! layers an optional TOML file and `LWD_`-prefixed environment variables on
//! top; command-line flags are applied by the binary afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use lwd_core::error::LwdError;
use lwd_core::hash::{BlockHasher, DoubleSha256Hasher};

/// Header hash names accepted in `block_hash`.
pub const SUPPORTED_BLOCK_HASHES: &[&str] = &["sha256d"];

/// Configuration for a lightwalletd instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root directory for the block cache.
    pub data_dir: PathBuf,
    /// Chain name; selects the cache file names.
    pub chain_name: String,
    /// Header hash of the chain, one of [`SUPPORTED_BLOCK_HASHES`].
    pub block_hash: String,
    /// JSON-RPC endpoint of the full node.
    pub node_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    /// Address the query server listens on.
    pub bind_addr: String,
    /// Capacity of the in-memory hot cache, in blocks.
    pub cache_size: usize,
    /// Per-block timeout for range queries that fall back to the node.
    pub request_timeout_secs: u64,
    /// Discard the cache files at startup and ingest from scratch.
    pub redownload: bool,
    /// Reject blocks whose coinbase height differs from the requested one.
    pub strict_height: bool,
    /// Log level filter string (e.g. "info", "lwd_node_lib=debug").
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lightwalletd");

        Self {
            data_dir,
            chain_name: "VRSC".to_string(),
            block_hash: "sha256d".to_string(),
            node_url: "http://127.0.0.1:2786".to_string(),
            rpc_user: None,
            rpc_password: None,
            bind_addr: "127.0.0.1:9067".to_string(),
            cache_size: 1_500_000,
            request_timeout_secs: 30,
            redownload: false,
            strict_height: false,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load from an optional TOML file, then `LWD_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, LwdError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix("LWD").try_parsing(true))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| LwdError::Config(e.to_string()))
    }

    /// Directory holding this chain's cache files.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("db").join(&self.chain_name)
    }

    pub fn blocks_path(&self) -> PathBuf {
        self.cache_dir().join(format!("{}-blocks", self.chain_name))
    }

    pub fn lengths_path(&self) -> PathBuf {
        self.cache_dir().join(format!("{}-lengths", self.chain_name))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The header hash named by `block_hash`.
    pub fn block_hasher(&self) -> Result<Arc<dyn BlockHasher>, LwdError> {
        match self.block_hash.as_str() {
            "sha256d" => Ok(Arc::new(DoubleSha256Hasher)),
            other => Err(LwdError::Config(format!(
                "unsupported block_hash {other:?} (supported: {})",
                SUPPORTED_BLOCK_HASHES.join(", ")
            ))),
        }
    }
}
