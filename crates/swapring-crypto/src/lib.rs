//! SwapRing Crypto - cryptographic primitives
//!
//! This crate provides:
//! - Ed25519 key pairs and the rotating key set
//! - Signature envelopes over canonical payloads
//! - Hashing (SHA-256)
//! - Merkle trees and inclusion proofs for custody snapshots
//!
//! # Invariant
//!
//! The signing input is always `canonical(obj minus signature)` -
//! never the raw serialized object.

pub mod hash;
pub mod keys;
pub mod merkle;
pub mod signature;

pub use hash::*;
pub use keys::*;
pub use merkle::*;
pub use signature::*;

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key {0} has no private material")]
    PrivateKeyUnavailable(String),

    #[error("Canonicalization failed: {0}")]
    Canonical(#[from] swapring_canonical::CanonicalError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
