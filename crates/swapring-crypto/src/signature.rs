//! Signature envelopes over canonical payloads
//!
//! Signed objects embed `signature: {key_id, alg, sig}`. The signing
//! input is the canonical form of the object with the `signature`
//! field removed, so any other byte of the object is covered.

use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};
use serde_json::Value;

use crate::{CryptoError, CryptoResult, KeySet, KeyStatus};
use swapring_types::SignatureEnvelope;

/// Outcome of verifying a signed object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    MissingSignature,
    UnknownKeyId,
    KeyRevoked,
    BadSignature,
    PayloadShape,
}

impl VerifyOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Stable error string for envelopes and logs
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Ok => None,
            Self::MissingSignature => Some("missing_signature"),
            Self::UnknownKeyId => Some("unknown_key_id"),
            Self::KeyRevoked => Some("key_revoked"),
            Self::BadSignature => Some("bad_signature"),
            Self::PayloadShape => Some("payload_shape"),
        }
    }
}

/// The canonical bytes an object's signature covers
pub fn signing_bytes(value: &Value) -> CryptoResult<Vec<u8>> {
    let mut unsigned = value.clone();
    if let Some(map) = unsigned.as_object_mut() {
        map.remove("signature");
    }
    Ok(swapring_canonical::canonical_bytes(&unsigned)?)
}

/// Sign an object with the key set's active key
pub fn sign_object(keyset: &KeySet, value: &Value) -> CryptoResult<SignatureEnvelope> {
    sign_object_with_key(keyset, &keyset.active_key_id, value)
}

/// Sign an object with an explicit key from the set
pub fn sign_object_with_key(
    keyset: &KeySet,
    key_id: &str,
    value: &Value,
) -> CryptoResult<SignatureEnvelope> {
    if !value.is_object() {
        return Err(CryptoError::SigningFailed(
            "signable payload must be a JSON object".into(),
        ));
    }
    let pair = keyset.keypair_for(key_id)?;
    let bytes = signing_bytes(value)?;
    Ok(SignatureEnvelope::new(key_id, pair.sign(&bytes)))
}

/// Attach an envelope to an object in place
pub fn attach_signature(value: &mut Value, envelope: &SignatureEnvelope) -> CryptoResult<()> {
    let map = value.as_object_mut().ok_or_else(|| {
        CryptoError::SigningFailed("signable payload must be a JSON object".into())
    })?;
    map.insert(
        "signature".to_string(),
        serde_json::to_value(envelope)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?,
    );
    Ok(())
}

fn extract_envelope(value: &Value) -> Result<SignatureEnvelope, VerifyOutcome> {
    let map = value.as_object().ok_or(VerifyOutcome::PayloadShape)?;
    let raw = map.get("signature").ok_or(VerifyOutcome::MissingSignature)?;
    serde_json::from_value(raw.clone()).map_err(|_| VerifyOutcome::PayloadShape)
}

fn verify_with_key(
    verifying_key: &VerifyingKey,
    value: &Value,
    envelope: &SignatureEnvelope,
) -> VerifyOutcome {
    let Ok(bytes) = signing_bytes(value) else {
        return VerifyOutcome::PayloadShape;
    };
    let Ok(sig_bytes) = hex::decode(&envelope.sig) else {
        return VerifyOutcome::PayloadShape;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return VerifyOutcome::PayloadShape;
    };
    let signature = Ed25519Signature::from_bytes(&sig_array);
    match verifying_key.verify(&bytes, &signature) {
        Ok(()) => VerifyOutcome::Ok,
        Err(_) => VerifyOutcome::BadSignature,
    }
}

/// Verify a signed object against the key set. Any non-revoked key
/// matching the envelope's `key_id` is accepted.
pub fn verify_object(keyset: &KeySet, value: &Value) -> VerifyOutcome {
    let envelope = match extract_envelope(value) {
        Ok(e) => e,
        Err(outcome) => return outcome,
    };
    let Some(record) = keyset.find(&envelope.key_id) else {
        return VerifyOutcome::UnknownKeyId;
    };
    if record.status == KeyStatus::Revoked {
        return VerifyOutcome::KeyRevoked;
    }
    let Ok(verifying_key) = record.verifying_key() else {
        return VerifyOutcome::PayloadShape;
    };
    verify_with_key(&verifying_key, value, &envelope)
}

/// Verify a signed object against a caller-supplied public key,
/// optionally pinning the expected `key_id`.
pub fn verify_object_with_public_key(
    public_key_hex: &str,
    expected_key_id: Option<&str>,
    value: &Value,
) -> VerifyOutcome {
    let envelope = match extract_envelope(value) {
        Ok(e) => e,
        Err(outcome) => return outcome,
    };
    if let Some(expected) = expected_key_id {
        if envelope.key_id != expected {
            return VerifyOutcome::UnknownKeyId;
        }
    }
    let Ok(decoded) = hex::decode(public_key_hex) else {
        return VerifyOutcome::PayloadShape;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(decoded.as_slice()) else {
        return VerifyOutcome::PayloadShape;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return VerifyOutcome::PayloadShape;
    };
    verify_with_key(&verifying_key, value, &envelope)
}
