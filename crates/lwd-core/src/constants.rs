//! Wire-format and protocol constants.

/// Serialized header size excluding the length-prefixed solution.
pub const HEADER_FIXED_SIZE: usize = 140;

/// Legacy difficulty value found in the genesis coinbase where a height
/// would otherwise be encoded. Decodes to height 0.
pub const GENESIS_TARGET_DIFFICULTY: u64 = 520_617_983;

/// Largest CompactSize accepted by the node's deserializer.
pub const MAX_COMPACT_SIZE: u64 = 0x0200_0000;

/// Consensus branch id of the Sapling upgrade, as keyed in `getblockchaininfo`.
pub const SAPLING_BRANCH_ID: &str = "76b809bb";

/// Version group id required on v3 (Overwinter) transactions.
pub const OVERWINTER_VERSION_GROUP_ID: u32 = 0x03C4_8270;

/// Version group id required on v4 (Sapling) transactions.
pub const SAPLING_VERSION_GROUP_ID: u32 = 0x892F_2085;

/// Serialized size of a Sapling spend description in a v4 transaction.
pub const SPEND_DESCRIPTION_SIZE: usize = 384;

/// Serialized size of a Sapling output description in a v4 transaction.
pub const OUTPUT_DESCRIPTION_SIZE: usize = 948;

/// Size of a full Sapling note ciphertext.
pub const ENC_CIPHERTEXT_SIZE: usize = 580;

/// Prefix of the note ciphertext kept in compact outputs. Enough for trial
/// decryption of the note plaintext without the memo.
pub const COMPACT_CIPHERTEXT_SIZE: usize = 52;

/// JoinSplit proof size before Sapling (BCTV14 / PHGR13).
pub const PHGR_PROOF_SIZE: usize = 296;

/// JoinSplit proof size from Sapling onwards (Groth16).
pub const GROTH_PROOF_SIZE: usize = 192;

/// Compact block protobuf schema version written by this crate.
pub const COMPACT_PROTO_VERSION: u32 = 1;

/// JSON-RPC error code the node returns when a height is beyond its tip.
pub const RPC_INVALID_PARAMETER: i32 = -8;
