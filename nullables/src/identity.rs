//! Nullable identity: a fixed key pair whose signatures can be corrupted.

use std::sync::atomic::{AtomicBool, Ordering};

use peerlink_crypto::{Identity, KeyIdentity};
use peerlink_types::{NodeAddress, PublicKey, Signature};

pub struct NullIdentity {
    inner: KeyIdentity,
    forge: AtomicBool,
}

impl NullIdentity {
    /// Deterministic identity for `seed`.
    pub fn new(seed: u8) -> Self {
        Self {
            inner: KeyIdentity::from_seed(&[seed; 32]),
            forge: AtomicBool::new(false),
        }
    }

    /// Make every subsequent signature invalid.
    pub fn set_forging(&self, forge: bool) {
        self.forge.store(forge, Ordering::SeqCst);
    }
}

impl Identity for NullIdentity {
    fn public_key(&self) -> &PublicKey {
        self.inner.public_key()
    }

    fn address(&self) -> &NodeAddress {
        self.inner.address()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        let mut signature = self.inner.sign(message);
        if self.forge.load(Ordering::SeqCst) {
            signature.0[0] ^= 0xff;
        }
        signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_like_the_seeded_key() {
        let null = NullIdentity::new(4);
        let real = KeyIdentity::from_seed(&[4; 32]);
        assert_eq!(null.address(), real.address());
        assert_eq!(null.sign(b"m"), real.sign(b"m"));
    }

    #[test]
    fn forged_signatures_fail_verification() {
        let null = NullIdentity::new(4);
        null.set_forging(true);
        let signature = null.sign(b"m");
        assert!(!null.verify(null.public_key(), b"m", &signature));
    }
}
