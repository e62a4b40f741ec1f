//! Node address type with `pl_` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A peerlink node address, always prefixed with `pl_`.
///
/// Derived from the node's public key by `peerlink_crypto::derive_address`.
/// This type only checks the shape of the string; checksum validation lives
/// next to the derivation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    pub const PREFIX: &'static str = "pl_";

    /// Encoded length after the prefix: 32 chars of key hash + 8 chars of checksum.
    pub const ENCODED_LEN: usize = 40;

    /// Parse an address string, checking prefix, length and alphabet.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let Some(encoded) = raw.strip_prefix(Self::PREFIX) else {
            return Err(TypesError::InvalidAddress(raw.to_string()));
        };
        if encoded.len() != Self::ENCODED_LEN
            || !encoded.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
        {
            return Err(TypesError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Wrap an already-encoded address without validation.
    pub fn from_encoded(encoded: String) -> Self {
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The base32 part after the prefix.
    pub fn encoded_part(&self) -> &str {
        self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn well_formed() -> String {
        format!("pl_{}", "a".repeat(NodeAddress::ENCODED_LEN))
    }

    #[test]
    fn parse_accepts_well_formed() {
        let addr = NodeAddress::parse(&well_formed()).unwrap();
        assert_eq!(addr.encoded_part().len(), NodeAddress::ENCODED_LEN);
    }

    #[test]
    fn parse_rejects_wrong_prefix() {
        let raw = format!("xx_{}", "a".repeat(NodeAddress::ENCODED_LEN));
        assert!(NodeAddress::parse(&raw).is_err());
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(NodeAddress::parse("pl_abc").is_err());
        assert!(NodeAddress::parse("pl_").is_err());
    }

    #[test]
    fn parse_rejects_uppercase() {
        let raw = format!("pl_{}", "A".repeat(NodeAddress::ENCODED_LEN));
        assert!(NodeAddress::parse(&raw).is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let addr = NodeAddress::parse(&well_formed()).unwrap();
        let bytes = bincode::serialize(&addr).unwrap();
        let plain = bincode::serialize(&well_formed()).unwrap();
        assert_eq!(bytes, plain);
    }
}
