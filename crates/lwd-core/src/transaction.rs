//! Transaction parsing for versions 1 through 4.
//!
//! Only the pieces a compact block needs are kept: transparent inputs (for
//! the coinbase height and the fee rule), transparent output values, Sapling
//! spend nullifiers and output note data, and JoinSplit public values. All
//! other fields are skipped by size.

use crate::compact::{CompactSaplingOutput, CompactSaplingSpend, CompactTx};
use crate::constants::{
    COMPACT_CIPHERTEXT_SIZE, ENC_CIPHERTEXT_SIZE, GROTH_PROOF_SIZE, OUTPUT_DESCRIPTION_SIZE,
    OVERWINTER_VERSION_GROUP_ID, PHGR_PROOF_SIZE, SAPLING_VERSION_GROUP_ID, SPEND_DESCRIPTION_SIZE,
};
use crate::error::ParseError;
use crate::hash::double_sha256;
use crate::reader::ByteReader;
use crate::types::Hash256;

/// Smallest possible transparent input: outpoint, empty script, sequence.
const MIN_TX_IN_SIZE: usize = 32 + 4 + 1 + 4;
/// Smallest possible transparent output: value and empty script.
const MIN_TX_OUT_SIZE: usize = 8 + 1;
/// JoinSplit description excluding the proof.
const JOINSPLIT_SIZE_WITHOUT_PROOF: usize = 8 + 8 + 32 + 64 + 64 + 32 + 32 + 64 + 1202;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prev_txid: Hash256,
    pub prev_index: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            prev_txid: Hash256(reader.read_array("TxIn prev txid")?),
            prev_index: reader.read_u32("TxIn prev index")?,
            script_sig: reader.read_compact_prefixed("TxIn script sig")?.to_vec(),
            sequence: reader.read_u32("TxIn sequence")?,
        })
    }

    /// The null outpoint that marks a coinbase input.
    pub fn is_null(&self) -> bool {
        self.prev_txid.is_zero() && self.prev_index == u32::MAX
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script: Vec<u8>,
}

impl TxOut {
    fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            value: reader.read_u64("TxOut value")?,
            script: reader.read_compact_prefixed("TxOut script")?.to_vec(),
        })
    }
}

/// Sapling spend description; only the nullifier is retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spend {
    pub nullifier: [u8; 32],
}

impl Spend {
    fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        reader.skip(32, "Spend cv")?;
        reader.skip(32, "Spend anchor")?;
        let nullifier = reader.read_array("Spend nullifier")?;
        reader.skip(32, "Spend rk")?;
        reader.skip(GROTH_PROOF_SIZE, "Spend zkproof")?;
        reader.skip(64, "Spend auth sig")?;
        Ok(Self { nullifier })
    }
}

/// Sapling output description; the out-ciphertext and proof are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub cmu: [u8; 32],
    pub ephemeral_key: [u8; 32],
    pub enc_ciphertext: Vec<u8>,
}

impl Output {
    fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        reader.skip(32, "Output cv")?;
        let cmu = reader.read_array("Output cmu")?;
        let ephemeral_key = reader.read_array("Output ephemeral key")?;
        let enc_ciphertext = reader.read_bytes(ENC_CIPHERTEXT_SIZE, "Output enc ciphertext")?.to_vec();
        reader.skip(80, "Output out ciphertext")?;
        reader.skip(GROTH_PROOF_SIZE, "Output zkproof")?;
        Ok(Self { cmu, ephemeral_key, enc_ciphertext })
    }
}

/// Sprout JoinSplit; only the public values are retained, for the fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSplit {
    pub vpub_old: u64,
    pub vpub_new: u64,
}

impl JoinSplit {
    fn parse(reader: &mut ByteReader<'_>, proof_size: usize) -> Result<Self, ParseError> {
        let vpub_old = reader.read_u64("JoinSplit vpub_old")?;
        let vpub_new = reader.read_u64("JoinSplit vpub_new")?;
        reader.skip(32, "JoinSplit anchor")?;
        reader.skip(64, "JoinSplit nullifiers")?;
        reader.skip(64, "JoinSplit commitments")?;
        reader.skip(32, "JoinSplit ephemeral key")?;
        reader.skip(32, "JoinSplit random seed")?;
        reader.skip(64, "JoinSplit vmacs")?;
        reader.skip(proof_size, "JoinSplit proof")?;
        reader.skip(1202, "JoinSplit enc ciphertexts")?;
        Ok(Self { vpub_old, vpub_new })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub overwintered: bool,
    pub version: u32,
    pub version_group_id: Option<u32>,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
    pub expiry_height: Option<u32>,
    pub value_balance: Option<i64>,
    pub spends: Vec<Spend>,
    pub shielded_outputs: Vec<Output>,
    pub join_splits: Vec<JoinSplit>,
    raw: Vec<u8>,
    txid: Hash256,
}

impl Transaction {
    /// Parse one transaction from the reader's current position.
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ParseError> {
        let start = reader.position();

        let header = reader.read_u32("tx header")?;
        let overwintered = header >> 31 == 1;
        let version = header & 0x7FFF_FFFF;

        let expected_group = match (version, overwintered) {
            (1 | 2, false) => None,
            (3, true) => Some(OVERWINTER_VERSION_GROUP_ID),
            (4, true) => Some(SAPLING_VERSION_GROUP_ID),
            _ => return Err(ParseError::UnsupportedTxVersion { version, overwintered }),
        };
        let version_group_id = match expected_group {
            Some(expected) => {
                let actual = reader.read_u32("tx version group id")?;
                if actual != expected {
                    return Err(ParseError::InvalidVersionGroup { version, actual });
                }
                Some(actual)
            }
            None => None,
        };

        let input_count = reader.read_count(MIN_TX_IN_SIZE, "tx input count")?;
        let inputs = (0..input_count)
            .map(|_| TxIn::parse(reader))
            .collect::<Result<Vec<_>, _>>()?;
        let output_count = reader.read_count(MIN_TX_OUT_SIZE, "tx output count")?;
        let outputs = (0..output_count)
            .map(|_| TxOut::parse(reader))
            .collect::<Result<Vec<_>, _>>()?;
        let lock_time = reader.read_u32("tx lock time")?;

        let expiry_height = if version >= 3 {
            Some(reader.read_u32("tx expiry height")?)
        } else {
            None
        };

        let mut value_balance = None;
        let mut spends = Vec::new();
        let mut shielded_outputs = Vec::new();
        if version >= 4 {
            value_balance = Some(reader.read_i64("tx value balance")?);
            let spend_count = reader.read_count(SPEND_DESCRIPTION_SIZE, "tx spend count")?;
            spends = (0..spend_count)
                .map(|_| Spend::parse(reader))
                .collect::<Result<Vec<_>, _>>()?;
            let shielded_output_count = reader.read_count(OUTPUT_DESCRIPTION_SIZE, "tx shielded output count")?;
            shielded_outputs = (0..shielded_output_count)
                .map(|_| Output::parse(reader))
                .collect::<Result<Vec<_>, _>>()?;
        }

        let mut join_splits = Vec::new();
        if version >= 2 {
            let proof_size = if version >= 4 { GROTH_PROOF_SIZE } else { PHGR_PROOF_SIZE };
            let join_split_count = reader.read_count(JOINSPLIT_SIZE_WITHOUT_PROOF + proof_size, "tx joinsplit count")?;
            join_splits = (0..join_split_count)
                .map(|_| JoinSplit::parse(reader, proof_size))
                .collect::<Result<Vec<_>, _>>()?;
            if !join_splits.is_empty() {
                reader.skip(32, "tx joinsplit pubkey")?;
                reader.skip(64, "tx joinsplit sig")?;
            }
        }

        if !spends.is_empty() || !shielded_outputs.is_empty() {
            reader.skip(64, "tx binding sig")?;
        }

        let raw = reader.consumed_since(start).to_vec();
        let txid = double_sha256(&raw);

        Ok(Self {
            overwintered,
            version,
            version_group_id,
            inputs,
            outputs,
            lock_time,
            expiry_height,
            value_balance,
            spends,
            shielded_outputs,
            join_splits,
            raw,
            txid,
        })
    }

    /// Parse a transaction from the front of `data`, returning the unread tail.
    pub fn parse_from_slice(data: &[u8]) -> Result<(&[u8], Self), ParseError> {
        let mut reader = ByteReader::new(data);
        let tx = Self::parse(&mut reader)?;
        Ok((reader.remaining(), tx))
    }

    /// Transaction id in wire order.
    pub fn txid(&self) -> Hash256 {
        self.txid
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_null()
    }

    pub fn has_shielded_elements(&self) -> bool {
        !self.spends.is_empty() || !self.shielded_outputs.is_empty()
    }

    /// Fee paid, when it can be derived without looking up spent outputs.
    ///
    /// With no transparent inputs the value entering the transparent pool is
    /// fully described by the shielded value balance and the JoinSplit
    /// public values.
    pub fn fee(&self) -> Option<u32> {
        if !self.inputs.is_empty() {
            return None;
        }
        let mut fee = i128::from(self.value_balance.unwrap_or(0));
        for js in &self.join_splits {
            fee += i128::from(js.vpub_new);
            fee -= i128::from(js.vpub_old);
        }
        for out in &self.outputs {
            fee -= i128::from(out.value);
        }
        u32::try_from(fee).ok()
    }

    pub fn to_compact(&self, index: u64) -> CompactTx {
        CompactTx {
            index,
            hash: self.txid.0.to_vec(),
            fee: self.fee(),
            spends: self
                .spends
                .iter()
                .map(|spend| CompactSaplingSpend { nf: spend.nullifier.to_vec() })
                .collect(),
            outputs: self
                .shielded_outputs
                .iter()
                .map(|output| CompactSaplingOutput {
                    cmu: output.cmu.to_vec(),
                    epk: output.ephemeral_key.to_vec(),
                    ciphertext: output.enc_ciphertext[..COMPACT_CIPHERTEXT_SIZE].to_vec(),
                })
                .collect(),
        }
    }
}
