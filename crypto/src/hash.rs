//! Cryptographic hash functions.

use sha3::{Digest, Keccak256};

/// Compute Keccak-256 hash (pre-standard SHA-3 padding, as used by EVM chains).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute Keccak-256 hash and return as hex string.
pub fn keccak256_hex(data: &[u8]) -> String {
    hex::encode(keccak256(data))
}
