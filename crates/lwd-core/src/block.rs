//! Full block decoding and projection to a [`CompactBlock`].

use std::sync::OnceLock;

use crate::compact::CompactBlock;
use crate::constants::{COMPACT_PROTO_VERSION, GENESIS_TARGET_DIFFICULTY};
use crate::error::ParseError;
use crate::hash::BlockHasher;
use crate::header::BlockHeader;
use crate::reader::{read_script_int, ByteReader};
use crate::transaction::Transaction;
use crate::types::Hash256;

/// Smallest serialized transaction: header, two empty counts, lock time.
const MIN_TX_SIZE: usize = 4 + 1 + 1 + 4;

#[derive(Debug)]
pub struct Block {
    pub header: BlockHeader,
    header_bytes: Vec<u8>,
    pub transactions: Vec<Transaction>,
    height: OnceLock<Option<u64>>,
}

impl Block {
    /// Parse a block from the front of `data`, returning the unread tail.
    pub fn parse_from_slice(data: &[u8]) -> Result<(&[u8], Self), ParseError> {
        let mut reader = ByteReader::new(data);
        let header = BlockHeader::parse(&mut reader)?;
        let header_bytes = reader.consumed_since(0).to_vec();

        let tx_count = reader.read_count(MIN_TX_SIZE, "tx count")?;
        let mut transactions = Vec::with_capacity(tx_count);
        for index in 0..tx_count {
            let tx = Transaction::parse(&mut reader)
                .map_err(|e| ParseError::Transaction { index, source: Box::new(e) })?;
            transactions.push(tx);
        }

        Ok((
            reader.remaining(),
            Self { header, header_bytes, transactions, height: OnceLock::new() },
        ))
    }

    /// Parse exactly one block; trailing bytes are an error.
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let (rest, block) = Self::parse_from_slice(data)?;
        if !rest.is_empty() {
            return Err(ParseError::Overlong(rest.len()));
        }
        Ok(block)
    }

    /// Serialized header as it appeared on the wire.
    pub fn header_bytes(&self) -> &[u8] {
        &self.header_bytes
    }

    pub fn prev_hash(&self) -> Hash256 {
        self.header.prev_hash
    }

    /// Height encoded in the coinbase script, if readable.
    pub fn height(&self) -> Option<u64> {
        *self.height.get_or_init(|| self.coinbase_height())
    }

    fn coinbase_height(&self) -> Option<u64> {
        let script = &self.transactions.first()?.inputs.first()?.script_sig;
        let value = u64::try_from(read_script_int(script)?).ok()?;
        if value == GENESIS_TARGET_DIFFICULTY {
            return Some(0);
        }
        if value > u64::from(u32::MAX) {
            return None;
        }
        Some(value)
    }

    /// Block hash in wire order, at the coinbase height.
    pub fn encodable_hash(&self, hasher: &dyn BlockHasher) -> Result<Hash256, ParseError> {
        let height = self.height().ok_or(ParseError::UnknownHeight)?;
        Ok(hasher.encodable_hash(&self.header_bytes, height))
    }

    pub fn display_hash(&self, hasher: &dyn BlockHasher) -> Result<Hash256, ParseError> {
        let height = self.height().ok_or(ParseError::UnknownHeight)?;
        Ok(hasher.display_hash(&self.header_bytes, height))
    }

    /// Project to a compact block at the coinbase height.
    pub fn to_compact(&self, hasher: &dyn BlockHasher) -> Result<CompactBlock, ParseError> {
        let height = self.height().ok_or(ParseError::UnknownHeight)?;
        Ok(self.to_compact_at(hasher, height))
    }

    /// Project to a compact block at an externally known height.
    pub fn to_compact_at(&self, hasher: &dyn BlockHasher, height: u64) -> CompactBlock {
        let vtx = self
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.has_shielded_elements())
            .map(|(index, tx)| tx.to_compact(index as u64))
            .collect();

        CompactBlock {
            proto_version: COMPACT_PROTO_VERSION,
            height,
            hash: hasher.encodable_hash(&self.header_bytes, height).0.to_vec(),
            prev_hash: self.header.prev_hash.0.to_vec(),
            time: self.header.time,
            header: self.header_bytes.clone(),
            vtx,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_vectors {
    use super::*;
    use crate::reader::write_compact_size;
    use crate::transaction::test_vectors::coinbase_v1;

    pub fn header(prev: Hash256, time: u32) -> BlockHeader {
        BlockHeader {
            version: 4,
            prev_hash: prev,
            merkle_root: Hash256([0x22; 32]),
            final_sapling_root: Hash256([0x33; 32]),
            time,
            bits: [0xff, 0xff, 0x07, 0x1f],
            nonce: [0x44; 32],
            solution: vec![0x55; 72],
        }
    }

    /// Script pushing `height` as a minimal little-endian integer.
    pub fn height_script(height: u64) -> Vec<u8> {
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

    pub fn raw_block(prev: Hash256, coinbase_script: &[u8], extra: &[Vec<u8>]) -> Vec<u8> {
        let mut out = header(prev, 1_600_000_000).encode();
        write_compact_size(&mut out, 1 + extra.len() as u64);
        out.extend_from_slice(&coinbase_v1(coinbase_script, 50_000));
        for tx in extra {
            out.extend_from_slice(tx);
        }
        out
    }
}
