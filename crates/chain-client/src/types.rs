//! the EVM primitives that flow between the indexer, the pool and the relayer:
//! 20-byte addresses and 32-byte transaction/block hashes.

use serde::{Deserialize, Serialize};

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

/// a 20-byte EVM address. The all-zero address is the native-token sentinel
/// used throughout the pool (spec.md §4.5 "token address (native sentinel =
/// zero address)").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const NATIVE: Self = Self([0u8; 20]);

    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let bytes = hex::decode(strip_0x(s)).map_err(|_| AddressParseError)?;
        let arr: [u8; 20] = bytes.try_into().map_err(|_| AddressParseError)?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not a valid 20-byte hex address")]
pub struct AddressParseError;

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.to_hex()
    }
}

/// a 32-byte transaction hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let bytes = hex::decode(strip_0x(s)).map_err(|_| AddressParseError)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| AddressParseError)?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for TxHash {
    type Error = AddressParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<TxHash> for String {
    fn from(h: TxHash) -> Self {
        h.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_address_is_zero() {
        assert!(Address::NATIVE.is_native());
        assert_eq!(Address::NATIVE.to_hex(), format!("0x{}", "00".repeat(20)));
    }

    #[test]
    fn address_roundtrips_through_hex() {
        let a = Address([7u8; 20]);
        assert_eq!(Address::from_hex(&a.to_hex()).unwrap(), a);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Address::from_hex("0x1234").is_err());
    }
}
