//! Node identity: the key pair a node signs with and the address it is known by.

use std::path::Path;

use peerlink_types::{KeyPair, NodeAddress, PrivateKey, PublicKey, Signature};

use crate::{derive_address, generate_keypair, keypair_from_seed, sign_message, verify_signature};
use crate::CryptoError;

/// File name of the hex-encoded seed inside the key directory.
pub const KEY_FILE_NAME: &str = "node.key";

/// The identity collaborator used by the peer directory.
///
/// `verify` and `derive_address` have default implementations since they do
/// not depend on the local key.
pub trait Identity: Send + Sync {
    fn public_key(&self) -> &PublicKey;

    fn address(&self) -> &NodeAddress;

    fn sign(&self, message: &[u8]) -> Signature;

    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        verify_signature(message, signature, public_key)
    }

    fn derive_address(&self, public_key: &PublicKey) -> NodeAddress {
        derive_address(public_key)
    }
}

/// Ed25519 identity backed by an in-memory key pair.
pub struct KeyIdentity {
    keys: KeyPair,
    address: NodeAddress,
}

impl KeyIdentity {
    pub fn new(keys: KeyPair) -> Self {
        let address = derive_address(&keys.public);
        Self { keys, address }
    }

    pub fn generate() -> Self {
        Self::new(generate_keypair())
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(keypair_from_seed(seed))
    }

    /// Load the seed from `<dir>/node.key`, creating a fresh one if the file
    /// does not exist yet.
    pub fn load_or_generate(dir: &Path) -> Result<Self, CryptoError> {
        let path = dir.join(KEY_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let mut seed = [0u8; 32];
                hex::decode_to_slice(contents.trim(), &mut seed)
                    .map_err(|_| CryptoError::InvalidKeyFile(path.display().to_string()))?;
                let identity = Self::from_seed(&seed);
                tracing::info!(address = %identity.address, "loaded node key");
                Ok(identity)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let identity = Self::generate();
                identity.write_seed(dir, &path)?;
                tracing::info!(
                    address = %identity.address,
                    path = %path.display(),
                    "generated node key"
                );
                Ok(identity)
            }
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn write_seed(&self, dir: &Path, path: &Path) -> Result<(), CryptoError> {
        std::fs::create_dir_all(dir).map_err(|e| io_error(path, e))?;
        std::fs::write(path, hex::encode(self.private_key().0)).map_err(|e| io_error(path, e))
    }

    fn private_key(&self) -> &PrivateKey {
        &self.keys.private
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CryptoError {
    CryptoError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl Identity for KeyIdentity {
    fn public_key(&self) -> &PublicKey {
        &self.keys.public
    }

    fn address(&self) -> &NodeAddress {
        &self.address
    }

    fn sign(&self, message: &[u8]) -> Signature {
        sign_message(message, &self.keys.private)
    }
}
