//! Block header wire format.
//!
//! ```text
//! version              i32     4
//! prev block hash      [u8]   32
//! merkle root          [u8]   32
//! final sapling root   [u8]   32
//! time                 u32     4
//! nBits                [u8]    4
//! nonce                [u8]   32
//! solution             CompactSize-prefixed bytes
//! ```

use crate::constants::HEADER_FIXED_SIZE;
use crate::error::ParseError;
use crate::reader::{compact_size_len, write_compact_size, ByteReader};
use crate::types::Hash256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    pub final_sapling_root: Hash256,
    pub time: u32,
    pub bits: [u8; 4],
    pub nonce: [u8; 32],
    pub solution: Vec<u8>,
}

impl BlockHeader {
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            version: reader.read_i32("header version")?,
            prev_hash: Hash256(reader.read_array("prev block hash")?),
            merkle_root: Hash256(reader.read_array("merkle root")?),
            final_sapling_root: Hash256(reader.read_array("final sapling root")?),
            time: reader.read_u32("header time")?,
            bits: reader.read_array("nBits")?,
            nonce: reader.read_array("nonce")?,
            solution: reader.read_compact_prefixed("solution")?.to_vec(),
        })
    }

    /// Parse a header from the front of `data`, returning the unread tail.
    pub fn parse_from_slice(data: &[u8]) -> Result<(&[u8], Self), ParseError> {
        let mut reader = ByteReader::new(data);
        let header = Self::parse(&mut reader)?;
        Ok((reader.remaining(), header))
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_FIXED_SIZE + compact_size_len(self.solution.len() as u64) + self.solution.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.prev_hash.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        out.extend_from_slice(self.final_sapling_root.as_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits);
        out.extend_from_slice(&self.nonce);
        write_compact_size(&mut out, self.solution.len() as u64);
        out.extend_from_slice(&self.solution);
        out
    }

    /// Compact difficulty target as the integer the node reports.
    pub fn nbits(&self) -> u32 {
        u32::from_le_bytes(self.bits)
    }
}
