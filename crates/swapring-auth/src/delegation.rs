//! Signed bearer delegation tokens
//!
//! A token is the hex encoding of a canonical JSON envelope holding
//! the grant plus `{key_id, alg, sig}`. Signatures survive key
//! rotation as long as the signing key is not revoked; revoking the
//! stored grant makes every token referencing it introspect inactive.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use swapring_crypto::{
    attach_signature, sign_object_with_key, verify_object, KeySet, VerifyOutcome,
};
use swapring_store::Store;
use swapring_types::{
    DelegationGrant, DelegationId, IntrospectReason, IntrospectResult, Result, SwapError,
};

use crate::PolicyConfig;

/// Encode and sign a grant into a bearer token string
pub fn encode_token(
    keyset: &KeySet,
    config: &PolicyConfig,
    grant: &DelegationGrant,
) -> Result<String> {
    let signing_key_id = config
        .delegation_token_signing_active_key_id
        .as_deref()
        .unwrap_or(&keyset.active_key_id);

    let mut value = serde_json::to_value(grant)
        .map_err(|e| SwapError::internal(format!("grant serialization: {}", e)))?;
    let signature = sign_object_with_key(keyset, signing_key_id, &value)
        .map_err(|e| SwapError::internal(format!("token signing: {}", e)))?;
    attach_signature(&mut value, &signature)
        .map_err(|e| SwapError::internal(format!("token signing: {}", e)))?;

    let bytes = swapring_canonical::canonical_bytes(&value)
        .map_err(|e| SwapError::internal(format!("token encoding: {}", e)))?;
    Ok(hex::encode(bytes))
}

/// Decode a bearer token back into its signed JSON envelope
pub fn decode_token(token: &str) -> Option<Value> {
    let bytes = hex::decode(token).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn inactive(reason: IntrospectReason, details: Value) -> IntrospectResult {
    IntrospectResult {
        active: false,
        reason,
        details,
    }
}

/// Introspect a token against the key set and the stored grants
pub fn introspect_token(
    keyset: &KeySet,
    stored: impl Fn(&DelegationId) -> Option<DelegationGrant>,
    token: &str,
    now: DateTime<Utc>,
) -> IntrospectResult {
    let Some(value) = decode_token(token) else {
        return inactive(
            IntrospectReason::BadSignature,
            serde_json::json!({"error": "token is not a valid envelope"}),
        );
    };

    match verify_object(keyset, &value) {
        VerifyOutcome::Ok => {}
        VerifyOutcome::UnknownKeyId | VerifyOutcome::KeyRevoked => {
            return inactive(
                IntrospectReason::UnknownKeyId,
                serde_json::json!({"error": "signing key unavailable"}),
            );
        }
        _ => {
            return inactive(
                IntrospectReason::BadSignature,
                serde_json::json!({"error": "signature verification failed"}),
            );
        }
    }

    let grant: DelegationGrant = {
        let mut unsigned = value.clone();
        if let Some(map) = unsigned.as_object_mut() {
            map.remove("signature");
        }
        match serde_json::from_value(unsigned) {
            Ok(g) => g,
            Err(_) => {
                return inactive(
                    IntrospectReason::BadSignature,
                    serde_json::json!({"error": "grant payload malformed"}),
                );
            }
        }
    };

    // Revocation lives on the stored grant, not the bearer copy.
    let current = stored(&grant.delegation_id).unwrap_or_else(|| grant.clone());
    if current.is_revoked() || grant.is_revoked() {
        return inactive(
            IntrospectReason::Revoked,
            serde_json::json!({"delegation_id": grant.delegation_id}),
        );
    }
    if now < grant.not_before {
        return inactive(
            IntrospectReason::NotYetValid,
            serde_json::json!({"not_before": grant.not_before}),
        );
    }
    if now > grant.expires_at {
        return inactive(
            IntrospectReason::Expired,
            serde_json::json!({"expires_at": grant.expires_at}),
        );
    }
    if grant.scopes.is_empty() {
        return inactive(
            IntrospectReason::BadSignature,
            serde_json::json!({"error": "grant carries no scopes"}),
        );
    }

    IntrospectResult {
        active: true,
        reason: IntrospectReason::Ok,
        details: serde_json::json!({
            "delegation_id": grant.delegation_id,
            "principal": grant.principal_actor,
            "delegate": grant.delegate_actor,
            "scopes": grant.scopes,
        }),
    }
}

/// Store-backed issue/introspect/revoke
pub struct DelegationAuthority {
    store: Arc<Store>,
}

impl DelegationAuthority {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Persist a grant and return its signed bearer token
    pub async fn issue(
        &self,
        keyset: &KeySet,
        config: &PolicyConfig,
        grant: DelegationGrant,
    ) -> Result<(DelegationGrant, String)> {
        if grant.scopes.is_empty() {
            return Err(SwapError::validation("delegation grant requires scopes"));
        }
        if grant.expires_at <= grant.not_before {
            return Err(SwapError::validation(
                "delegation expiry must follow not_before",
            ));
        }
        let token = encode_token(keyset, config, &grant)?;
        let stored = grant.clone();
        self.store
            .mutate(move |state| {
                state
                    .delegations
                    .insert(stored.delegation_id.clone(), stored.clone());
                Ok(())
            })
            .await?;
        info!(delegation_id = %grant.delegation_id, "delegation issued");
        Ok((grant, token))
    }

    pub async fn introspect(
        &self,
        keyset: &KeySet,
        token: &str,
        now: DateTime<Utc>,
    ) -> IntrospectResult {
        let state = self.store.read().await;
        introspect_token(keyset, |id| state.delegations.get(id).cloned(), token, now)
    }

    /// Stamp `revoked_at` on the stored grant
    pub async fn revoke(&self, delegation_id: &DelegationId, now: DateTime<Utc>) -> Result<()> {
        let delegation_id = delegation_id.clone();
        self.store
            .mutate(move |state| {
                let grant = state.delegations.get_mut(&delegation_id).ok_or_else(|| {
                    SwapError::not_found("delegation", delegation_id.as_str())
                })?;
                if grant.revoked_at.is_none() {
                    grant.revoked_at = Some(now);
                }
                Ok(())
            })
            .await
    }
}
