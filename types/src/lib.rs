//! Fundamental types for peerlink.
//!
//! This crate defines the value types shared across the workspace: node
//! addresses, key material, message priorities, and connection identity.

pub mod address;
pub mod connection;
pub mod error;
pub mod keys;
pub mod priority;

pub use address::NodeAddress;
pub use connection::{ConnectionId, TransportKind};
pub use error::TypesError;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use priority::{EncryptMode, Priority};
