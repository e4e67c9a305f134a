//! lightwalletd daemon.
//!
//! Ingests blocks from a full node into the compact block cache and serves
//! the cache to light wallet clients over JSON-RPC.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use lwd_core::traits::{BlockCache, BlockMirror};
use lwd_node_lib::clock::TokioSleeper;
use lwd_node_lib::fetch::check_block_hasher;
use lwd_node_lib::mirror::MirrorFanout;
use lwd_node_lib::node_client::{get_chain_info_with_retry, ReqwestNode};
use lwd_node_lib::{
    start_rpc_server, BlockService, FileBlockCache, Ingestor, IngestorConfig, MemoryBlockCache, ServiceConfig,
};

/// Events queued for mirrors before new ones are dropped.
const MIRROR_QUEUE_DEPTH: usize = 1_024;

#[derive(Parser, Debug)]
#[command(
    name = "lightwalletd",
    version,
    about = "Compact block cache and query server for light wallet clients"
)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the block cache
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Chain name used for the cache file names
    #[arg(long)]
    chain_name: Option<String>,

    /// Header hash of the chain ("sha256d")
    #[arg(long)]
    block_hash: Option<String>,

    /// Full node JSON-RPC URL
    #[arg(long)]
    node_url: Option<String>,

    /// Full node RPC user
    #[arg(long)]
    rpc_user: Option<String>,

    /// Full node RPC password
    #[arg(long)]
    rpc_password: Option<String>,

    /// Address for the query server
    #[arg(long)]
    bind_addr: Option<String>,

    /// Blocks kept in the in-memory cache
    #[arg(long)]
    cache_size: Option<usize>,

    /// Discard the block cache and ingest from the start height
    #[arg(long)]
    redownload: bool,

    /// Reject blocks whose coinbase height differs from the requested height
    #[arg(long)]
    strict_height: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    /// Load the file and environment layers, then apply flags on top.
    fn into_config(self) -> Result<ServiceConfig> {
        let mut config = ServiceConfig::load(self.config.as_deref()).context("loading configuration")?;

        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(chain_name) = self.chain_name {
            config.chain_name = chain_name;
        }
        if let Some(block_hash) = self.block_hash {
            config.block_hash = block_hash;
        }
        if let Some(node_url) = self.node_url {
            config.node_url = node_url;
        }
        if self.rpc_user.is_some() {
            config.rpc_user = self.rpc_user;
        }
        if self.rpc_password.is_some() {
            config.rpc_password = self.rpc_password;
        }
        if let Some(bind_addr) = self.bind_addr {
            config.bind_addr = bind_addr;
        }
        if let Some(cache_size) = self.cache_size {
            config.cache_size = cache_size;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(log_format) = self.log_format {
            config.log_format = log_format;
        }
        config.redownload |= self.redownload;
        config.strict_height |= self.strict_height;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    init_logging(&config.log_level, &config.log_format);

    info!("lightwalletd v{}", env!("CARGO_PKG_VERSION"));
    info!("node_url: {}", config.node_url);
    info!("cache_dir: {:?}", config.cache_dir());
    info!("bind_addr: {}", config.bind_addr);

    let hasher = config.block_hasher().context("selecting block hash")?;
    let sleeper = Arc::new(TokioSleeper);
    let rpc = Arc::new(
        ReqwestNode::new(
            &config.node_url,
            config.rpc_user.clone(),
            config.rpc_password.clone(),
            config.request_timeout(),
        )
        .context("building node RPC client")?,
    );

    let chain_info = get_chain_info_with_retry(rpc.as_ref(), sleeper.as_ref())
        .await
        .context("querying node chain info")?;
    let start_height = chain_info.sapling_activation_height();

    // A hasher that does not match the chain would make every block look
    // like a reorg.
    match check_block_hasher(rpc.as_ref(), hasher.as_ref(), start_height).await {
        Ok(Some(true)) => info!(block_hash = %config.block_hash, "block hash matches node chain"),
        Ok(Some(false)) => bail!(
            "block hash {:?} does not match the node's chain at height {start_height}",
            config.block_hash
        ),
        Ok(None) => warn!(height = start_height, "node has too few blocks to check the block hash"),
        Err(e) => warn!("could not check the block hash: {e}"),
    }

    let cache = if config.redownload {
        FileBlockCache::open_truncated(config.cache_dir(), &config.chain_name, start_height)
    } else {
        FileBlockCache::open(config.cache_dir(), &config.chain_name, start_height)
    };
    let cache = Arc::new(cache.context("opening block cache")?);

    let hot = Arc::new(MemoryBlockCache::new(start_height, config.cache_size));
    let mirrors: Vec<Arc<dyn BlockMirror>> = vec![hot.clone()];
    let (fanout, _mirror_task) = MirrorFanout::spawn(mirrors, MIRROR_QUEUE_DEPTH);

    let ingest_config = IngestorConfig { strict_height: config.strict_height, ..IngestorConfig::default() };
    let mut ingestor = Ingestor::new(cache.clone(), rpc.clone(), hasher.clone(), sleeper, ingest_config)
        .with_mirrors(fanout);

    let service = Arc::new(
        BlockService::new(cache.clone(), rpc, hasher)
            .with_hot_cache(hot)
            .with_request_timeout(config.request_timeout())
            .with_strict_height(config.strict_height),
    );
    let rpc_handle = start_rpc_server(&config.bind_addr, service)
        .await
        .context("starting query server")?;
    info!("query server listening on {}", config.bind_addr);

    let outcome = tokio::select! {
        result = ingestor.run(None) => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("failed to listen for Ctrl+C: {e}");
            }
            info!("shutdown signal received");
            Ok(())
        }
    };

    if let Err(e) = cache.sync() {
        warn!("failed to flush block cache: {e}");
    }
    rpc_handle.stop().ok();
    info!("query server stopped");

    if let Err(e) = outcome {
        error!("block ingestor stopped: {e}");
        return Err(e).context("block ingestion failed");
    }
    info!("lightwalletd shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text. `RUST_LOG` overrides `level_str`.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
