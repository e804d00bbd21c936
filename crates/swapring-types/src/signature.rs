//! Signature envelope carried by signed objects
//!
//! The envelope is pure data here; signing and verification live in
//! `swapring-crypto`. Signing input is always the canonical form of
//! the object with the `signature` field removed.

use serde::{Deserialize, Serialize};

/// Embedded signature block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    /// Identifier of the signing key within the key set
    pub key_id: String,
    /// Signature algorithm, always "ed25519"
    pub alg: String,
    /// Hex-encoded signature bytes
    pub sig: String,
}

impl SignatureEnvelope {
    pub fn new(key_id: impl Into<String>, sig: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            alg: "ed25519".to_string(),
            sig: sig.into(),
        }
    }
}
