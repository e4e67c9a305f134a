//! Compact block protobuf messages.
//!
//! Field numbers follow the wallet compact-format schema so that persisted
//! bytes can be handed to wallet clients without re-encoding. Hashes are in
//! wire order.

use crate::types::Hash256;

/// A block reduced to the data a light wallet needs to scan for its own
/// shielded notes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactBlock {
    /// Schema version of this message.
    #[prost(uint32, tag = "1")]
    pub proto_version: u32,
    #[prost(uint64, tag = "2")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub prev_hash: ::prost::alloc::vec::Vec<u8>,
    /// Unix epoch seconds from the header.
    #[prost(uint32, tag = "5")]
    pub time: u32,
    /// Serialized block header.
    #[prost(bytes = "vec", tag = "6")]
    pub header: ::prost::alloc::vec::Vec<u8>,
    /// Transactions with shielded components, in block order.
    #[prost(message, repeated, tag = "7")]
    pub vtx: ::prost::alloc::vec::Vec<CompactTx>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactTx {
    /// Position of the transaction in the full block.
    #[prost(uint64, tag = "1")]
    pub index: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    /// Absent unless computable from the transaction alone.
    #[prost(uint32, optional, tag = "3")]
    pub fee: ::core::option::Option<u32>,
    #[prost(message, repeated, tag = "4")]
    pub spends: ::prost::alloc::vec::Vec<CompactSaplingSpend>,
    #[prost(message, repeated, tag = "5")]
    pub outputs: ::prost::alloc::vec::Vec<CompactSaplingOutput>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactSaplingSpend {
    #[prost(bytes = "vec", tag = "1")]
    pub nf: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactSaplingOutput {
    /// Note commitment u-coordinate.
    #[prost(bytes = "vec", tag = "1")]
    pub cmu: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub epk: ::prost::alloc::vec::Vec<u8>,
    /// First 52 bytes of the note ciphertext.
    #[prost(bytes = "vec", tag = "3")]
    pub ciphertext: ::prost::alloc::vec::Vec<u8>,
}

impl CompactBlock {
    /// The block hash, if the message carries a 32-byte one.
    pub fn block_hash(&self) -> Option<Hash256> {
        Hash256::try_from(self.hash.as_slice()).ok()
    }

    pub fn prev_block_hash(&self) -> Option<Hash256> {
        Hash256::try_from(self.prev_hash.as_slice()).ok()
    }
}
