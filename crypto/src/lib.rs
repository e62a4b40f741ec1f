//! Cryptographic identity for peerlink nodes.
//!
//! - **Ed25519** for signing node identities
//! - **Blake2b** for hashing public keys into addresses
//! - Address derivation with `pl_` prefix and checksummed base32 encoding

pub mod address;
pub mod error;
pub mod hash;
pub mod identity;
pub mod keys;
pub mod sign;

pub use address::{derive_address, validate_address};
pub use error::CryptoError;
pub use hash::{blake2b_160, blake2b_256};
pub use identity::{Identity, KeyIdentity};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
