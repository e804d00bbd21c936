//! Partner program records
//!
//! Rollout policies are versioned per partner; every change lands in
//! the rollout-policy audit journal. Usage counters back export quota
//! checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ActorRef, AuditEntryId};

/// Versioned rollout policy for one partner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutPolicy {
    pub partner_id: String,
    pub version: u64,
    /// A frozen policy rejects further upserts while the freeze flag is enforced
    pub frozen: bool,
    pub config: serde_json::Value,
    pub updated_by: ActorRef,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a policy audit journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAuditEntry {
    pub id: AuditEntryId,
    pub partner_id: String,
    pub action: String,
    pub policy_version: u64,
    pub actor: ActorRef,
    pub occurred_at: DateTime<Utc>,
    pub details: serde_json::Value,
}

/// Per-partner usage counters, keyed by export kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartnerUsage {
    pub partner_id: String,
    pub export_counts: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PartnerUsage {
    pub fn record_export(&mut self, kind: &str, now: DateTime<Utc>) -> u64 {
        let count = self.export_counts.entry(kind.to_string()).or_insert(0);
        *count += 1;
        self.updated_at = Some(now);
        *count
    }
}
