//! Hashing utilities for SwapRing

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::CryptoResult;

/// Compute SHA-256 hash of data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 hash and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Compute hash of multiple concatenated items
pub fn hash_all(items: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(item);
    }
    hasher.finalize().into()
}

/// Hash the canonical form of a JSON value
pub fn hash_canonical(value: &Value) -> CryptoResult<String> {
    let bytes = swapring_canonical::canonical_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// Hash the canonical form of any serializable value
pub fn hash_canonical_of<T: serde::Serialize>(value: &T) -> CryptoResult<String> {
    let bytes = swapring_canonical::canonical_bytes_of(value)?;
    Ok(sha256_hex(&bytes))
}
