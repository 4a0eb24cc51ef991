//! Core type definitions for the escrow service

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{EscrowError, Result};

/// Scheme identifier (128-bit opaque id, externally assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemeId(pub uuid::Uuid);

impl SchemeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Big-endian integer over the full 128 bits, as the remote ledger keys it.
    pub fn ledger_id(&self) -> u128 {
        u128::from_be_bytes(*self.0.as_bytes())
    }
}

impl Default for SchemeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SchemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Amount in the smallest settlement unit.
///
/// Stored as decimal text in sqlite and JSON; SQLite integers and
/// serde_json numbers both top out below wei-scale values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wei(pub u128);

impl Wei {
    pub fn new(v: u128) -> Self {
        Self(v)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Wei) -> Option<Wei> {
        self.0.checked_add(other.0).map(Wei)
    }

    pub fn checked_sub(self, other: Wei) -> Option<Wei> {
        self.0.checked_sub(other.0).map(Wei)
    }

    /// Parse a decimal text column back into an amount.
    pub fn from_text(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u128>()
            .map(Wei)
            .map_err(|_| EscrowError::Internal(format!("unparseable amount: {s:?}")))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self> {
        Wei::from_text(s)
    }
}

impl From<u128> for Wei {
    fn from(v: u128) -> Self {
        Wei(v)
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>().map(Wei).map_err(serde::de::Error::custom)
    }
}

/// Validate a 40-hex-char settlement address and normalize it to
/// lowercase with a `0x` prefix. Empty input is rejected; callers that
/// allow an unset vendor pass `Option` instead.
pub fn normalize_address(addr: &str) -> Result<String> {
    let stripped = addr.strip_prefix("0x").unwrap_or(addr);
    if stripped.len() != 40 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EscrowError::MalformedAddress(addr.to_string()));
    }
    Ok(format!("0x{}", stripped.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_ledger_id_is_big_endian_over_all_bits() {
        let id = SchemeId::from_uuid(uuid::Uuid::from_bytes([
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 2,
        ]));
        assert_eq!(id.ledger_id(), 258);

        let max = SchemeId::from_uuid(uuid::Uuid::from_bytes([0xff; 16]));
        assert_eq!(max.ledger_id(), u128::MAX);
    }

    #[test]
    fn wei_text_round_trip() {
        let big = Wei::new(340_282_366_920_938_463_463_374_607_431_768_211_455);
        assert_eq!(Wei::from_text(&big.to_string()).unwrap(), big);
        assert!(Wei::from_text("not-a-number").is_err());
        assert!(Wei::from_text("-5").is_err());
    }

    #[test]
    fn wei_checked_arithmetic() {
        assert_eq!(Wei::new(40).checked_add(Wei::new(2)), Some(Wei::new(42)));
        assert_eq!(Wei::new(40).checked_sub(Wei::new(41)), None);
        assert_eq!(Wei::new(u128::MAX).checked_add(Wei::new(1)), None);
    }

    #[test]
    fn address_normalization() {
        let addr = "0xABCDEF0123456789abcdef0123456789ABCDEF01";
        assert_eq!(
            normalize_address(addr).unwrap(),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        // without prefix
        assert_eq!(
            normalize_address("ABCDEF0123456789abcdef0123456789ABCDEF01").unwrap(),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert!(normalize_address("").is_err());
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address("0xZZCDEF0123456789abcdef0123456789ABCDEF01").is_err());
    }

    #[test]
    fn wei_serde_uses_decimal_strings() {
        let v = serde_json::to_value(Wei::new(1_000_000_000_000_000_000)).unwrap();
        assert_eq!(v, serde_json::json!("1000000000000000000"));
        let back: Wei = serde_json::from_value(v).unwrap();
        assert_eq!(back, Wei::new(1_000_000_000_000_000_000));
    }
}
