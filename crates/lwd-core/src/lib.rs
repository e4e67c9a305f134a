//! # lwd-core
//! Wire decoding, compact block types, and the storage contracts shared by
//! the cache and ingestion crates.

pub mod block;
pub mod compact;
pub mod constants;
pub mod error;
pub mod hash;
pub mod header;
pub mod reader;
pub mod traits;
pub mod transaction;
pub mod types;
