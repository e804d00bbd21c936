//! Vault holdings and custody snapshots
//!
//! The vault is a ledger of reservations, not physical custody. A
//! holding is appended on deposit, reserved for at most one cycle,
//! then released or withdrawn; records are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorRef, AssetId, CycleId, HoldingId, ReservationId, SnapshotId};

/// Lifecycle status of a vault holding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldingStatus {
    Deposited,
    Reserved,
    Released,
    Withdrawn,
}

/// A vault holding record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultHolding {
    pub holding_id: HoldingId,
    pub vault_id: String,
    pub owner_actor: ActorRef,
    pub asset_id: AssetId,
    pub status: HoldingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ReservationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_cycle_id: Option<CycleId>,
    /// Caller-supplied deposit reference, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_ref: Option<String>,
    pub deposited_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawn_at: Option<DateTime<Utc>>,
}

/// Proof-of-custody snapshot: a Merkle commitment over holdings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodySnapshot {
    pub snapshot_id: SnapshotId,
    pub vault_id: String,
    /// Hex Merkle root over canonical holding leaves
    pub root_hash: String,
    /// Holding IDs in leaf order
    pub holding_ids: Vec<HoldingId>,
    /// Leaf hashes at snapshot time, so proofs outlive later mutation
    pub leaf_hashes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Inclusion proof for one holding within a custody snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub snapshot_id: SnapshotId,
    pub holding_id: HoldingId,
    pub leaf_index: usize,
    /// Hex leaf hash
    pub leaf_hash: String,
    /// Sibling path bottom-up; `left` marks siblings on the left
    pub siblings: Vec<ProofSibling>,
    pub root_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofSibling {
    pub left: bool,
    pub hash: String,
}
