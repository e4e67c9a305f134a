//! # lwd-node: block cache, ingestion, and query service.
//!
//! Composes the lightwalletd service:
//! - [`cache::FileBlockCache`]: persistent, reorg-aware compact block store
//! - [`memory::MemoryBlockCache`]: bounded hot mirror of the newest blocks
//! - [`ingestor::Ingestor`]: loop keeping the cache in step with the node
//! - [`service::BlockService`]: single-block and range queries
//! - [`rpc`]: JSON-RPC server for wallet clients
//! - [`config::ServiceConfig`]: service configuration

pub mod cache;
pub mod clock;
pub mod config;
pub mod fetch;
pub mod ingestor;
pub mod memory;
pub mod mirror;
pub mod node_client;
pub mod rpc;
pub mod service;

pub use cache::FileBlockCache;
pub use config::ServiceConfig;
pub use ingestor::{Ingestor, IngestorConfig};
pub use memory::MemoryBlockCache;
pub use rpc::start_rpc_server;
pub use service::BlockService;
