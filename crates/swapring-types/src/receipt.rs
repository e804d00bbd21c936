//! Settlement receipts
//!
//! A receipt is the signed terminal record of a cycle. Receipts are
//! immutable after signing; the signature covers the canonical receipt
//! payload with the `signature` field removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AssetId, CycleId, IntentId, ReceiptId, SignatureEnvelope};

/// Terminal outcome recorded by a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptFinalState {
    Completed,
    Failed,
}

/// The signed terminal record of a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub cycle_id: CycleId,
    pub final_state: ReceiptFinalState,
    pub intent_ids: Vec<IntentId>,
    pub asset_ids: Vec<AssetId>,
    /// Narrower cause on failure, e.g. "deposit_window_expired"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureEnvelope>,
}

impl Receipt {
    /// The receipt ID derived from its cycle
    pub fn id_for_cycle(cycle_id: &CycleId) -> ReceiptId {
        ReceiptId::from_string(format!("receipt_{}", cycle_id))
    }
}
