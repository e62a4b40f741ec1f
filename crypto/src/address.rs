//! Node address derivation.
//!
//! Address format: `pl_` + base32(blake2b_160(public_key), 32 chars)
//! + base32(checksum, 8 chars), where checksum is the first 5 bytes of
//! blake2b_256 over the key hash.

use peerlink_types::{NodeAddress, PublicKey};

use crate::hash::{blake2b_160, blake2b_256};

/// Base32 alphabet without the look-alike characters 0, 2, l and v.
const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

const HASH_CHARS: usize = 32;

/// Encode whole 5-byte groups; both address parts are multiples of 40 bits.
fn encode_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8 / 5);
    for group in bytes.chunks(5) {
        let mut acc = 0u64;
        for &b in group {
            acc = (acc << 8) | u64::from(b);
        }
        for shift in (0..8).rev() {
            out.push(ALPHABET[((acc >> (shift * 5)) & 0x1F) as usize] as char);
        }
    }
    out
}

fn decode_base32<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() * 5 != N * 8 {
        return None;
    }
    let mut out = [0u8; N];
    for (chunk, group) in s.as_bytes().chunks(8).zip(out.chunks_mut(5)) {
        let mut acc = 0u64;
        for &c in chunk {
            let value = ALPHABET.iter().position(|&a| a == c)?;
            acc = (acc << 5) | value as u64;
        }
        for (i, byte) in group.iter_mut().enumerate() {
            *byte = (acc >> ((4 - i) * 8)) as u8;
        }
    }
    Some(out)
}

fn checksum(key_hash: &[u8; 20]) -> [u8; 5] {
    let digest = blake2b_256(key_hash);
    let mut out = [0u8; 5];
    out.copy_from_slice(&digest[..5]);
    out
}

/// Derive the `pl_`-prefixed address for a public key.
pub fn derive_address(public_key: &PublicKey) -> NodeAddress {
    let key_hash = blake2b_160(public_key.as_bytes());
    NodeAddress::from_encoded(format!(
        "{}{}{}",
        NodeAddress::PREFIX,
        encode_base32(&key_hash),
        encode_base32(&checksum(&key_hash))
    ))
}

/// Check shape and checksum of an address string.
pub fn validate_address(address: &str) -> bool {
    let Ok(parsed) = NodeAddress::parse(address) else {
        return false;
    };
    let (hash_part, sum_part) = parsed.encoded_part().split_at(HASH_CHARS);
    match (decode_base32::<20>(hash_part), decode_base32::<5>(sum_part)) {
        (Some(key_hash), Some(sum)) => checksum(&key_hash) == sum,
        _ => false,
    }
}
