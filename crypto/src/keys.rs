//! Ed25519 key generation.

use ed25519_dalek::SigningKey;
use peerlink_types::{KeyPair, PrivateKey, PublicKey};
use rand::rngs::OsRng;

/// Generate a new Ed25519 key pair from the OS random source.
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    PublicKey(SigningKey::from_bytes(&private.0).verifying_key().to_bytes())
}

/// Deterministic key pair from a 32-byte seed.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let private = PrivateKey(*seed);
    KeyPair {
        public: public_from_private(&private),
        private,
    }
}
