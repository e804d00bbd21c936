//! SwapRing Vault - custody ledger
//!
//! The vault is a ledger of reservations, not physical custody.
//! Holdings are appended on deposit, tied to at most one settlement
//! cycle through a reservation, then released or withdrawn; records
//! are never deleted.
//!
//! The mutation primitives are free functions over `&mut AppState` so
//! the settlement engine can compose them inside a single store
//! transaction; [`VaultLedger`] wraps them for standalone operations.

pub mod custody;

pub use custody::*;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

use swapring_store::{AppState, Store};
use swapring_types::{
    ActorRef, AssetId, CycleId, HoldingId, HoldingStatus, ReservationId, Result, SwapError,
    VaultHolding,
};

/// Append a new deposited holding
pub fn deposit_holding(
    state: &mut AppState,
    owner_actor: ActorRef,
    asset_id: AssetId,
    vault_id: String,
    deposit_ref: Option<String>,
    now: DateTime<Utc>,
) -> VaultHolding {
    let holding = VaultHolding {
        holding_id: HoldingId::new(),
        vault_id,
        owner_actor,
        asset_id,
        status: HoldingStatus::Deposited,
        reservation_id: None,
        settlement_cycle_id: None,
        deposit_ref,
        deposited_at: now,
        updated_at: now,
        withdrawn_at: None,
    };
    state
        .vault_holdings
        .insert(holding.holding_id.clone(), holding.clone());
    info!(holding_id = %holding.holding_id, "vault deposit recorded");
    holding
}

fn holding_mut<'a>(state: &'a mut AppState, holding_id: &HoldingId) -> Result<&'a mut VaultHolding> {
    state
        .vault_holdings
        .get_mut(holding_id)
        .ok_or_else(|| SwapError::not_found("vault_holding", holding_id.as_str()))
}

/// Tie a deposited holding to a settlement cycle. A holding is
/// reserved at most once.
pub fn reserve_holding(
    state: &mut AppState,
    holding_id: &HoldingId,
    cycle_id: &CycleId,
    now: DateTime<Utc>,
) -> Result<ReservationId> {
    let holding = holding_mut(state, holding_id)?;
    if holding.reservation_id.is_some() || holding.status != HoldingStatus::Deposited {
        return Err(SwapError::conflict_with_reason(
            format!("holding {} is not available for reservation", holding_id),
            "already_reserved",
        ));
    }
    let reservation_id = ReservationId::new();
    holding.status = HoldingStatus::Reserved;
    holding.reservation_id = Some(reservation_id.clone());
    holding.settlement_cycle_id = Some(cycle_id.clone());
    holding.updated_at = now;
    Ok(reservation_id)
}

/// Un-tie a reserved holding and mark it released
pub fn release_reservation(
    state: &mut AppState,
    holding_id: &HoldingId,
    now: DateTime<Utc>,
) -> Result<()> {
    let holding = holding_mut(state, holding_id)?;
    if holding.status != HoldingStatus::Reserved {
        return Err(SwapError::conflict_with_reason(
            format!("holding {} has no active reservation", holding_id),
            "not_reserved",
        ));
    }
    holding.status = HoldingStatus::Released;
    holding.reservation_id = None;
    holding.updated_at = now;
    Ok(())
}

/// Withdraw a holding. `withdrawn_at` stamps are monotonic across the
/// whole ledger.
pub fn withdraw_holding(
    state: &mut AppState,
    holding_id: &HoldingId,
    expected_owner: Option<&ActorRef>,
    now: DateTime<Utc>,
) -> Result<()> {
    let last_withdrawn = state
        .vault_holdings
        .values()
        .filter_map(|h| h.withdrawn_at)
        .max();
    let holding = holding_mut(state, holding_id)?;

    if let Some(owner) = expected_owner {
        if &holding.owner_actor != owner {
            return Err(SwapError::conflict_with_reason(
                format!("holding {} is not owned by {}", holding_id, owner),
                "owner_mismatch",
            ));
        }
    }
    match holding.status {
        HoldingStatus::Deposited | HoldingStatus::Released => {}
        HoldingStatus::Reserved => {
            return Err(SwapError::conflict_with_reason(
                format!("holding {} is reserved for settlement", holding_id),
                "already_reserved",
            ));
        }
        HoldingStatus::Withdrawn => {
            return Err(SwapError::conflict_with_reason(
                format!("holding {} is already withdrawn", holding_id),
                "not_reserved",
            ));
        }
    }

    let stamp = match last_withdrawn {
        Some(prev) if prev >= now => prev + Duration::milliseconds(1),
        _ => now,
    };
    holding.status = HoldingStatus::Withdrawn;
    holding.withdrawn_at = Some(stamp);
    holding.updated_at = stamp;
    Ok(())
}

/// Store-backed vault operations
pub struct VaultLedger {
    store: Arc<Store>,
}

impl VaultLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn deposit(
        &self,
        owner_actor: ActorRef,
        asset_id: AssetId,
        vault_id: String,
        deposit_ref: Option<String>,
    ) -> Result<VaultHolding> {
        self.store
            .mutate(|state| {
                Ok(deposit_holding(
                    state,
                    owner_actor.clone(),
                    asset_id.clone(),
                    vault_id.clone(),
                    deposit_ref.clone(),
                    Utc::now(),
                ))
            })
            .await
    }

    pub async fn reserve(
        &self,
        holding_id: &HoldingId,
        cycle_id: &CycleId,
    ) -> Result<ReservationId> {
        self.store
            .mutate(|state| reserve_holding(state, holding_id, cycle_id, Utc::now()))
            .await
    }

    pub async fn release(&self, holding_id: &HoldingId) -> Result<()> {
        self.store
            .mutate(|state| release_reservation(state, holding_id, Utc::now()))
            .await
    }

    pub async fn withdraw(
        &self,
        holding_id: &HoldingId,
        expected_owner: Option<&ActorRef>,
    ) -> Result<()> {
        self.store
            .mutate(|state| withdraw_holding(state, holding_id, expected_owner, Utc::now()))
            .await
    }

    pub async fn get(&self, holding_id: &HoldingId) -> Result<VaultHolding> {
        self.store
            .read()
            .await
            .vault_holdings
            .get(holding_id)
            .cloned()
            .ok_or_else(|| SwapError::not_found("vault_holding", holding_id.as_str()))
    }

    pub async fn list(&self, owner: Option<&ActorRef>) -> Vec<VaultHolding> {
        self.store
            .read()
            .await
            .vault_holdings
            .values()
            .filter(|h| owner.map(|o| &h.owner_actor == o).unwrap_or(true))
            .cloned()
            .collect()
    }
}
