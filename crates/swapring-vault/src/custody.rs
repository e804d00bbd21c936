//! Custody snapshots - proof of custody over vault holdings
//!
//! A snapshot commits to the holding set with a Merkle root over
//! canonical holding leaves. Leaf hashes are captured at snapshot time
//! so inclusion proofs keep verifying after holdings mutate.

use chrono::{DateTime, Utc};
use tracing::info;

use swapring_crypto::{hash_canonical_of, merkle_proof, merkle_root, verify_merkle_proof};
use swapring_store::AppState;
use swapring_types::{
    CustodySnapshot, HoldingId, InclusionProof, Result, SnapshotId, SwapError,
};

/// Take a custody snapshot over one vault's holdings
pub fn take_custody_snapshot(
    state: &mut AppState,
    vault_id: &str,
    now: DateTime<Utc>,
) -> Result<CustodySnapshot> {
    // BTreeMap iteration gives holding-id order, which fixes leaf order.
    let holdings: Vec<_> = state
        .vault_holdings
        .values()
        .filter(|h| h.vault_id == vault_id)
        .collect();

    let mut holding_ids = Vec::with_capacity(holdings.len());
    let mut leaf_hashes = Vec::with_capacity(holdings.len());
    for holding in &holdings {
        holding_ids.push(holding.holding_id.clone());
        leaf_hashes
            .push(hash_canonical_of(holding).map_err(|e| SwapError::internal(e.to_string()))?);
    }

    let root_hash = merkle_root(&leaf_hashes).unwrap_or_default();
    let snapshot = CustodySnapshot {
        snapshot_id: SnapshotId::new(),
        vault_id: vault_id.to_string(),
        root_hash,
        holding_ids,
        leaf_hashes,
        created_at: now,
    };
    state.vault_custody_snapshots.push(snapshot.clone());
    info!(snapshot_id = %snapshot.snapshot_id, leaves = snapshot.leaf_hashes.len(), "custody snapshot taken");
    Ok(snapshot)
}

/// Build the inclusion proof for one holding within a snapshot
pub fn prove_inclusion(
    state: &AppState,
    snapshot_id: &SnapshotId,
    holding_id: &HoldingId,
) -> Result<InclusionProof> {
    let snapshot = state
        .vault_custody_snapshots
        .iter()
        .find(|s| &s.snapshot_id == snapshot_id)
        .ok_or_else(|| SwapError::not_found("custody_snapshot", snapshot_id.as_str()))?;

    let leaf_index = snapshot
        .holding_ids
        .iter()
        .position(|id| id == holding_id)
        .ok_or_else(|| SwapError::not_found("vault_holding", holding_id.as_str()))?;

    let siblings = merkle_proof(&snapshot.leaf_hashes, leaf_index);
    Ok(InclusionProof {
        snapshot_id: snapshot_id.clone(),
        holding_id: holding_id.clone(),
        leaf_index,
        leaf_hash: snapshot.leaf_hashes[leaf_index].clone(),
        siblings,
        root_hash: snapshot.root_hash.clone(),
    })
}

/// Verify an inclusion proof against its embedded root
pub fn verify_inclusion(proof: &InclusionProof) -> bool {
    verify_merkle_proof(&proof.leaf_hash, &proof.siblings, &proof.root_hash)
}
