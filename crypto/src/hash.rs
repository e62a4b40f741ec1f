//! Blake2b hashing.

use blake2::digest::consts::{U20, U32};
use blake2::{Blake2b, Digest};

type Blake2b160 = Blake2b<U20>;
type Blake2b256 = Blake2b<U32>;

/// 160-bit Blake2b digest, used as the key hash inside node addresses.
pub fn blake2b_160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Blake2b160::digest(data));
    out
}

/// 256-bit Blake2b digest.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b256::digest(data));
    out
}
