//! Core value types.
//!
//! Hashes are stored in wire (little-endian) order, the order in which they
//! appear in serialized headers and in compact blocks. The node's RPC
//! interface and block explorers print them reversed; [`Hash256::to_display_hex`]
//! and [`Hash256::from_display_hex`] convert between the two.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ParseError;

/// A 32-byte hash in wire order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Coinbase inputs reference it.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Wire-order bytes, as written into headers.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// All zeroes, as in a coinbase input's previous txid.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The same digest with its byte order reversed.
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        Self(bytes)
    }

    /// Hex in display (big-endian) order, as printed by the node.
    pub fn to_display_hex(&self) -> String {
        hex::encode(self.reversed().0)
    }

    /// Parse a display-order hex string into a wire-order hash.
    pub fn from_display_hex(s: &str) -> Result<Self, ParseError> {
        let bytes = hex::decode(s).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
        let hash = Self::try_from(bytes.as_slice())?;
        Ok(hash.reversed())
    }
}

/// Displays in the node's (reversed) order so log lines match explorer output.
impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Hash256 {
    type Error = ParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseError::InvalidHashLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Hash256 {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        Hash256(bytes)
    }

    #[test]
    fn display_is_reversed_hex() {
        let h = sample();
        let shown = h.to_string();
        assert!(shown.starts_with("1f1e1d"));
        assert!(shown.ends_with("020100"));
        assert_eq!(shown, h.to_display_hex());
    }

    #[test]
    fn display_hex_parses_back_to_wire_order() {
        let h = sample();
        let parsed = Hash256::from_display_hex(&h.to_display_hex()).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn try_from_rejects_wrong_length() {
        let err = Hash256::try_from(&[0u8; 31][..]).unwrap_err();
        assert_eq!(err, ParseError::InvalidHashLength(31));
    }

    #[test]
    fn zero_hash() {
        assert!(Hash256::ZERO.is_zero());
        assert!(!sample().is_zero());
    }
}
