//! Key material for node identity.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte Ed25519 public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

/// A 32-byte Ed25519 secret seed.
///
/// Not `Debug`, `Serialize` or `Clone`. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(pub [u8; 32]);

/// A 64-byte Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        let len = bytes.len();
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::invalid_length(len, &"64 bytes"))?;
        Ok(Signature(arr))
    }
}

pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_bincode_round_trip() {
        let sig = Signature([7u8; 64]);
        let bytes = bincode::serialize(&sig).unwrap();
        let back: Signature = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn short_signature_rejected() {
        let short = bincode::serialize(&vec![1u8; 10]).unwrap();
        assert!(bincode::deserialize::<Signature>(&short).is_err());
    }
}
