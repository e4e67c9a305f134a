//! Byte cursor for the node's little-endian serialization format.
//!
//! Every read names the field being read so a truncated block reports
//! where it ran out, and never yields a partial value.

use crate::constants::MAX_COMPACT_SIZE;
use crate::error::ParseError;

const OP_0: u8 = 0x00;
const OP_PUSHBYTES_8: u8 = 0x08;
const OP_1NEGATE: u8 = 0x4f;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;

/// Forward-only reader over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unread tail.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Bytes consumed since `start`, a value previously returned by
    /// [`position`](Self::position).
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.data[start.min(self.pos)..self.pos]
    }

    pub fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], ParseError> {
        let available = self.data.len() - self.pos;
        if len > available {
            return Err(ParseError::UnexpectedEof { field, needed: len, available });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], ParseError> {
        let bytes = self.read_bytes(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn skip(&mut self, len: usize, field: &'static str) -> Result<(), ParseError> {
        self.read_bytes(len, field).map(|_| ())
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, ParseError> {
        Ok(self.read_array::<1>(field)?[0])
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.read_array(field)?))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.read_array(field)?))
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32, ParseError> {
        Ok(i32::from_le_bytes(self.read_array(field)?))
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, ParseError> {
        Ok(u64::from_le_bytes(self.read_array(field)?))
    }

    pub fn read_i64(&mut self, field: &'static str) -> Result<i64, ParseError> {
        Ok(i64::from_le_bytes(self.read_array(field)?))
    }

    /// Read a Bitcoin-style CompactSize. Non-minimal encodings and values
    /// above [`MAX_COMPACT_SIZE`] are rejected, as the node itself does.
    pub fn read_compact_size(&mut self, field: &'static str) -> Result<u64, ParseError> {
        let size = match self.read_u8(field)? {
            tag @ 0..=0xfc => u64::from(tag),
            0xfd => {
                let v = u64::from(self.read_u16(field)?);
                if v < 0xfd {
                    return Err(ParseError::NonCanonicalCompactSize(field));
                }
                v
            }
            0xfe => {
                let v = u64::from(self.read_u32(field)?);
                if v < 0x1_0000 {
                    return Err(ParseError::NonCanonicalCompactSize(field));
                }
                v
            }
            0xff => {
                let v = self.read_u64(field)?;
                if v < 0x1_0000_0000 {
                    return Err(ParseError::NonCanonicalCompactSize(field));
                }
                v
            }
        };
        if size > MAX_COMPACT_SIZE {
            return Err(ParseError::CompactSizeTooLarge { field, size });
        }
        Ok(size)
    }

    /// Read a CompactSize element count, bounded so that `count` elements of
    /// at least `min_element_size` bytes could fit in the remaining input.
    pub fn read_count(&mut self, min_element_size: usize, field: &'static str) -> Result<usize, ParseError> {
        let count = self.read_compact_size(field)? as usize;
        let available = self.data.len() - self.pos;
        let needed = count.saturating_mul(min_element_size.max(1));
        if needed > available {
            return Err(ParseError::UnexpectedEof { field, needed, available });
        }
        Ok(count)
    }

    /// Read a CompactSize length followed by that many bytes.
    pub fn read_compact_prefixed(&mut self, field: &'static str) -> Result<&'a [u8], ParseError> {
        let len = self.read_compact_size(field)? as usize;
        self.read_bytes(len, field)
    }
}

/// Number of bytes [`write_compact_size`] emits for `n`.
pub fn compact_size_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Read the integer at the start of a script: `OP_0`, `OP_1NEGATE`,
/// `OP_1..OP_16`, or a direct push of up to eight bytes holding a
/// little-endian sign-magnitude value. Returns `None` for anything else.
pub fn read_script_int(script: &[u8]) -> Option<i64> {
    let (&opcode, rest) = script.split_first()?;
    match opcode {
        OP_0 => Some(0),
        OP_1NEGATE => Some(-1),
        OP_1..=OP_16 => Some(i64::from(opcode - OP_1) + 1),
        1..=OP_PUSHBYTES_8 => {
            let bytes = rest.get(..usize::from(opcode))?;
            let mut magnitude: u64 = 0;
            for (i, b) in bytes.iter().enumerate() {
                magnitude |= u64::from(*b) << (8 * i);
            }
            let sign_bit = 0x80u64 << (8 * (bytes.len() - 1));
            if magnitude & sign_bit != 0 {
                Some(-((magnitude & !sign_bit) as i64))
            } else {
                Some(magnitude as i64)
            }
        }
        _ => None,
    }
}
