//! Key management for SwapRing
//!
//! The runtime holds one `KeySet`: an active signing key plus retired
//! and revoked predecessors. Rotation adds a key and flips
//! `active_key_id` in one step; signatures made with retired keys stay
//! verifiable until the key is revoked.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{CryptoError, CryptoResult};

/// A key pair for signing operations
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Restore from a hex-encoded private key
    pub fn from_private_hex(private_hex: &str) -> CryptoResult<Self> {
        let bytes: [u8; 32] = hex::decode(private_hex)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("private key hex: {}", e)))?
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyFormat("private key must be 32 bytes".into()))?;
        Ok(Self::from_seed(&bytes))
    }

    /// Hex-encoded public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Hex-encoded private key (for key-set storage only)
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Sign a message, returning the hex-encoded signature
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

/// Lifecycle status of a key within the set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Retired,
    Revoked,
}

/// One key in the key set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: String,
    pub alg: String,
    pub status: KeyStatus,
    pub public_key_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_hex: Option<String>,
}

impl KeyRecord {
    pub fn verifying_key(&self) -> CryptoResult<VerifyingKey> {
        let bytes: [u8; 32] = hex::decode(&self.public_key_hex)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("public key hex: {}", e)))?
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyFormat("public key must be 32 bytes".into()))?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
    }

    pub fn keypair(&self) -> CryptoResult<KeyPair> {
        let private = self
            .private_key_hex
            .as_deref()
            .ok_or_else(|| CryptoError::PrivateKeyUnavailable(self.key_id.clone()))?;
        KeyPair::from_private_hex(private)
    }
}

/// The process-wide signing key set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySet {
    pub active_key_id: String,
    pub keys: Vec<KeyRecord>,
}

impl KeySet {
    /// Create a key set with one freshly generated active key
    pub fn generate(key_id: impl Into<String>) -> Self {
        let key_id = key_id.into();
        let pair = KeyPair::generate();
        Self {
            active_key_id: key_id.clone(),
            keys: vec![KeyRecord {
                key_id,
                alg: "ed25519".to_string(),
                status: KeyStatus::Active,
                public_key_hex: pair.public_key_hex(),
                private_key_hex: Some(pair.private_key_hex()),
            }],
        }
    }

    pub fn find(&self, key_id: &str) -> Option<&KeyRecord> {
        self.keys.iter().find(|k| k.key_id == key_id)
    }

    fn find_mut(&mut self, key_id: &str) -> Option<&mut KeyRecord> {
        self.keys.iter_mut().find(|k| k.key_id == key_id)
    }

    /// The record signing new payloads
    pub fn active_record(&self) -> CryptoResult<&KeyRecord> {
        self.find(&self.active_key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(self.active_key_id.clone()))
    }

    /// The key pair signing new payloads
    pub fn active_keypair(&self) -> CryptoResult<KeyPair> {
        self.active_record()?.keypair()
    }

    /// Key pair for an explicit key id, regardless of active status
    pub fn keypair_for(&self, key_id: &str) -> CryptoResult<KeyPair> {
        self.find(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?
            .keypair()
    }

    /// Add a new key and flip `active_key_id` to it in one step. The
    /// previous active key is retired, not revoked.
    pub fn rotate(&mut self, new_key_id: impl Into<String>) -> String {
        let new_key_id = new_key_id.into();
        let pair = KeyPair::generate();
        if let Some(old) = self.find_mut(&self.active_key_id.clone()) {
            if old.status == KeyStatus::Active {
                old.status = KeyStatus::Retired;
            }
        }
        self.keys.push(KeyRecord {
            key_id: new_key_id.clone(),
            alg: "ed25519".to_string(),
            status: KeyStatus::Active,
            public_key_hex: pair.public_key_hex(),
            private_key_hex: Some(pair.private_key_hex()),
        });
        self.active_key_id = new_key_id.clone();
        new_key_id
    }

    /// Revoke a key. Signatures referencing it stop verifying.
    pub fn revoke(&mut self, key_id: &str) -> CryptoResult<()> {
        let record = self
            .find_mut(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        record.status = KeyStatus::Revoked;
        Ok(())
    }
}
