use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of a Swarm address in bytes
pub const ADDRESS_SIZE: usize = 32;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address hex decode error: {0}")]
    Hex(String),
    #[error("invalid address size, expected {ADDRESS_SIZE}, got {0}")]
    Size(usize),
}

/// A 32 byte address in the Swarm address space
///
/// The same type names content (a chunk or file reference returned by an
/// upload) and nodes (a node's overlay address), since both live in the
/// same Kademlia space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwarmAddress([u8; ADDRESS_SIZE]);

impl SwarmAddress {
    pub const ZERO: SwarmAddress = SwarmAddress([0; ADDRESS_SIZE]);

    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse an address from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, AddressError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        if hex.len() != ADDRESS_SIZE * 2 {
            return Err(AddressError::Size(hex.len() / 2));
        }
        let mut buff = [0; ADDRESS_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|e| AddressError::Hex(e.to_string()))?;
        Ok(Self(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for SwarmAddress {
    type Error = AddressError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != ADDRESS_SIZE {
            return Err(AddressError::Size(bytes.len()));
        }
        let mut buff = [0; ADDRESS_SIZE];
        buff.copy_from_slice(bytes);
        Ok(Self(buff))
    }
}

impl From<[u8; ADDRESS_SIZE]> for SwarmAddress {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl FromStr for SwarmAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for SwarmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SwarmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwarmAddress({})", self.to_hex())
    }
}

impl Serialize for SwarmAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SwarmAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_with_prefix() {
        let hex = "0x".to_string() + &"ab".repeat(32);
        let addr = SwarmAddress::from_hex(&hex).unwrap();
        assert_eq!(addr.to_hex(), "ab".repeat(32));
    }

    #[test]
    fn test_rejects_short_hex() {
        assert_eq!(
            SwarmAddress::from_hex("abcd"),
            Err(AddressError::Size(2))
        );
    }

    #[test]
    fn test_serde_as_hex_string() {
        let addr = SwarmAddress::new([7; ADDRESS_SIZE]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        let back: SwarmAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
