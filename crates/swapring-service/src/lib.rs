//! SwapRing Service - the operation façade
//!
//! Every operation runs the same pipeline: resolve auth → idempotency
//! lookup → validate → authorize → mutate state → append events →
//! persist → respond. Mutations run inside a single store transaction,
//! so either the whole operation lands (including its idempotency
//! record) or nothing does.

pub mod delegations;
pub mod envelope;
pub mod exports;
pub mod intents;
pub mod marketplace;
pub mod partner;
pub mod settlement_ops;
pub mod vault_ops;
pub mod webhooks;

pub use envelope::{OperationRequest, ResponseEnvelope};

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use swapring_auth::{require_scopes, resolve, AuthContext, PolicyConfig};
use swapring_crypto::{hash_canonical, KeySet};
use swapring_matching::ShadowRunner;
use swapring_store::{AppState, Store, StoreConfig, StoreResult};
use swapring_types::{scope_key, IdempotencyRecord, Result, SwapError};

/// Bound on retained matcher shadow records
const SHADOW_RETENTION: usize = 32;

/// Export quota per partner and kind while partner-program enforcement
/// is on
pub(crate) const PARTNER_EXPORT_QUOTA: u64 = 1_000;

/// The service façade owning the store and key material
pub struct SwapService {
    store: Arc<Store>,
    keys: Arc<RwLock<KeySet>>,
    shadow: Mutex<ShadowRunner>,
}

impl SwapService {
    /// In-memory service with a fresh key set (tests, demos)
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(Store::in_memory()), KeySet::generate("key_1"))
    }

    pub fn with_store(store: Arc<Store>, keys: KeySet) -> Self {
        Self {
            store,
            keys: Arc::new(RwLock::new(keys)),
            shadow: Mutex::new(ShadowRunner::new(SHADOW_RETENTION)),
        }
    }

    /// Open over the configured persistence backend
    pub async fn open(config: &StoreConfig, keys: KeySet) -> StoreResult<Self> {
        let store = Store::open_with_config(config).await?;
        Ok(Self::with_store(Arc::new(store), keys))
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    /// Snapshot of the current key set
    pub async fn keyset(&self) -> KeySet {
        self.keys.read().await.clone()
    }

    /// Rotate the signing key set: add a key, flip the active ID
    pub async fn rotate_signing_key(&self, new_key_id: &str) -> String {
        self.keys.write().await.rotate(new_key_id)
    }

    /// Revoke a signing key; its signatures stop verifying
    pub async fn revoke_signing_key(&self, key_id: &str) -> Result<()> {
        self.keys
            .write()
            .await
            .revoke(key_id)
            .map_err(|_| SwapError::UnknownKeyId {
                key_id: key_id.to_string(),
            })
    }

    pub(crate) async fn shadow_runner(&self) -> tokio::sync::MutexGuard<'_, ShadowRunner> {
        self.shadow.lock().await
    }

    /// Run one state-mutating operation through the full pipeline.
    pub(crate) async fn execute<F>(
        &self,
        operation_id: &str,
        request: OperationRequest,
        required_scopes: &[&str],
        apply: F,
    ) -> ResponseEnvelope
    where
        F: FnOnce(&mut AppState, &Value, &AuthContext, &KeySet, &PolicyConfig) -> Result<Value>
            + Send,
    {
        let config = PolicyConfig::from_env();
        let keyset = self.keys.read().await.clone();
        let now = Utc::now();

        let outcome = self
            .store
            .mutate(move |state| {
                let context = resolve(
                    &request.auth,
                    &keyset,
                    |id| state.delegations.get(id).cloned(),
                    now,
                )?;

                // Idempotency lookup precedes validation and scope checks.
                let registry_key = match &request.idempotency_key {
                    Some(key) => {
                        let sk = scope_key(operation_id, key, &context.actor.fingerprint());
                        let payload_hash = hash_canonical(&request.body)
                            .map_err(|e| SwapError::internal(e.to_string()))?;
                        if let Some(record) = state.idempotency.get(&sk) {
                            if record.payload_hash == payload_hash {
                                debug!(operation_id, scope_key = %sk, "idempotent replay");
                                return Ok((record.result_envelope.clone(), true));
                            }
                            return Err(SwapError::IdempotencyConflict { scope_key: sk });
                        }
                        Some((sk, payload_hash))
                    }
                    None => None,
                };

                require_scopes(&config, &context, required_scopes)?;

                let body = apply(state, &request.body, &context, &keyset, &config)?;

                if let Some((sk, payload_hash)) = registry_key {
                    state.idempotency.insert(
                        sk.clone(),
                        IdempotencyRecord {
                            scope_key: sk,
                            payload_hash,
                            result_envelope: body.clone(),
                            created_at: now,
                        },
                    );
                }
                Ok((body, false))
            })
            .await;

        match outcome {
            Ok((body, true)) => ResponseEnvelope::replayed(body),
            Ok((body, false)) => ResponseEnvelope::success(body),
            Err(err) => ResponseEnvelope::error(&err),
        }
    }

    /// Run one read-only operation: resolve auth and scopes, no writes.
    pub(crate) async fn execute_read<F>(
        &self,
        _operation_id: &str,
        request: OperationRequest,
        required_scopes: &[&str],
        read: F,
    ) -> ResponseEnvelope
    where
        F: FnOnce(&AppState, &Value, &AuthContext, &KeySet, &PolicyConfig) -> Result<Value>,
    {
        let config = PolicyConfig::from_env();
        let keyset = self.keys.read().await.clone();
        let now = Utc::now();
        let state = self.store.read().await;

        let outcome = (|| {
            let context = resolve(
                &request.auth,
                &keyset,
                |id| state.delegations.get(id).cloned(),
                now,
            )?;
            require_scopes(&config, &context, required_scopes)?;
            read(&state, &request.body, &context, &keyset, &config)
        })();

        match outcome {
            Ok(body) => ResponseEnvelope::success(body),
            Err(err) => ResponseEnvelope::error(&err),
        }
    }
}

/// Body field helpers shared by the operation modules
pub(crate) fn body_str(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| SwapError::validation(format!("missing required field '{}'", key)))
}

pub(crate) fn body_str_opt(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

pub(crate) fn body_str_list(body: &Value, key: &str) -> Result<Vec<String>> {
    let items = body
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| SwapError::validation(format!("missing required field '{}'", key)))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| SwapError::validation(format!("'{}' must hold strings", key)))
        })
        .collect()
}
