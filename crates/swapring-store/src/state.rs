//! The persisted state tree
//!
//! Top-level keys match the snapshot layout exactly. Maps are keyed by
//! the resource's primary ID; journal lists are append-only.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use swapring_types::{
    Commit, CommitId, CustodySnapshot, CycleId, CycleProposal, DelegationGrant, DelegationId,
    EventEnvelope, ExportCheckpoint, HoldingId, IdempotencyRecord, IntentId, PartnerUsage,
    PolicyAuditEntry, ProposalId, Receipt, RolloutPolicy, SwapIntent, Timeline, VaultHolding,
};

/// Tenancy lookup tables: resource ID → owning partner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenancyIndex {
    #[serde(default)]
    pub proposals: BTreeMap<ProposalId, String>,
    #[serde(default)]
    pub cycles: BTreeMap<CycleId, String>,
}

/// The full application state tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub intents: BTreeMap<IntentId, SwapIntent>,
    #[serde(default)]
    pub proposals: BTreeMap<ProposalId, CycleProposal>,
    #[serde(default)]
    pub commits: BTreeMap<CommitId, Commit>,
    #[serde(default)]
    pub timelines: BTreeMap<CycleId, Timeline>,
    /// Journal: signed terminal records, append-only
    #[serde(default)]
    pub receipts: Vec<Receipt>,
    #[serde(default)]
    pub vault_holdings: BTreeMap<HoldingId, VaultHolding>,
    /// Journal: proof-of-custody snapshots, append-only
    #[serde(default)]
    pub vault_custody_snapshots: Vec<CustodySnapshot>,
    /// Journal: signed event outbox, append-only
    #[serde(default)]
    pub events: Vec<EventEnvelope>,
    /// Webhook dedup: event IDs already ingested
    #[serde(default)]
    pub webhook_seen: BTreeSet<String>,
    #[serde(default)]
    pub idempotency: BTreeMap<String, IdempotencyRecord>,
    #[serde(default)]
    pub delegations: BTreeMap<DelegationId, DelegationGrant>,
    /// Rollout policies keyed by partner
    #[serde(default)]
    pub partner_program: BTreeMap<String, RolloutPolicy>,
    #[serde(default)]
    pub partner_program_usage: BTreeMap<String, PartnerUsage>,
    /// Journal: commercial policy audit, append-only
    #[serde(default)]
    pub policy_audit: Vec<PolicyAuditEntry>,
    /// Journal: partner rollout policy audit, append-only
    #[serde(default)]
    pub rollout_policy_audit: Vec<PolicyAuditEntry>,
    /// Saved export checkpoints per export kind
    #[serde(default)]
    pub export_checkpoints: BTreeMap<String, Vec<ExportCheckpoint>>,
    #[serde(default)]
    pub tenancy: TenancyIndex,
}

impl AppState {
    /// Find a receipt by ID in the receipts journal
    pub fn receipt(&self, id: &str) -> Option<&Receipt> {
        self.receipts.iter().find(|r| r.id.as_str() == id)
    }

    /// Find a receipt for a cycle
    pub fn receipt_for_cycle(&self, cycle_id: &CycleId) -> Option<&Receipt> {
        self.receipts.iter().find(|r| &r.cycle_id == cycle_id)
    }

    /// Saved checkpoints for an export kind
    pub fn checkpoints(&self, kind: &str) -> &[ExportCheckpoint] {
        self.export_checkpoints
            .get(kind)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
