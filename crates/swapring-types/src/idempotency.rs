//! Idempotency registry records
//!
//! One record per `(operation, idempotency_key, actor fingerprint)`
//! scope key. The payload hash binds the key to the exact request
//! body; the stored envelope is what a replay returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A committed idempotent result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub scope_key: String,
    /// H(canonical(request body))
    pub payload_hash: String,
    /// The successful response envelope, replayed verbatim
    pub result_envelope: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Compose the scope key for an operation invocation
pub fn scope_key(operation: &str, idempotency_key: &str, actor_fingerprint: &str) -> String {
    format!("{}|{}|{}", operation, idempotency_key, actor_fingerprint)
}
