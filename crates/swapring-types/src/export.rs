//! Export and checkpoint types
//!
//! Exports are filtered, paginated, signed, chain-linked views of a
//! journal. A checkpoint is the serialized resumable state for an
//! export: cursor + attestation + a hash over both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SignatureEnvelope;

/// Attestation block embedded in an export payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationBlock {
    /// Chain hash immediately before the first included entry ("" at genesis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_after: Option<String>,
    /// Chain hash of the last included entry
    pub chain_hash: String,
}

/// Checkpoint block embedded in an export payload and persisted for resumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportCheckpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_chain_hash: Option<String>,
    pub query_context: serde_json::Value,
    pub exported_at: DateTime<Utc>,
    /// H(canonical(prior fields))
    pub checkpoint_hash: String,
}

/// Caller-supplied export query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ExportQuery {
    /// Whether the caller is asking to resume from a prior checkpoint
    pub fn is_resumption(&self) -> bool {
        self.cursor_after.is_some()
            || self.attestation_after.is_some()
            || self.checkpoint_after.is_some()
    }
}

/// A signed export payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub kind: String,
    pub exported_at: DateTime<Utc>,
    pub query: serde_json::Value,
    pub entries: Vec<serde_json::Value>,
    pub total_filtered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub attestation: AttestationBlock,
    pub checkpoint: ExportCheckpoint,
    /// H(canonical(payload minus signature))
    pub export_hash: String,
    pub signature: SignatureEnvelope,
}

/// Result of export verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportVerification {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportVerification {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
