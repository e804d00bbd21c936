//! Vault operations: holdings lifecycle and custody proofs

use serde_json::{json, Value};

use swapring_types::{ActorRef, AssetId, CycleId, HoldingId, Result, SnapshotId, SwapError};
use swapring_vault::{
    deposit_holding, prove_inclusion, release_reservation, reserve_holding,
    take_custody_snapshot, withdraw_holding,
};

use crate::{body_str, body_str_opt, OperationRequest, ResponseEnvelope, SwapService};

const DEFAULT_VAULT: &str = "vault_main";

fn parse_owner(body: &Value) -> Result<Option<ActorRef>> {
    match body.get("owner").and_then(|v| v.as_str()) {
        Some(raw) => ActorRef::parse(raw)
            .map(Some)
            .ok_or_else(|| SwapError::validation(format!("malformed owner '{}'", raw))),
        None => Ok(None),
    }
}

impl SwapService {
    /// `vault.deposit`
    pub async fn vault_deposit(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "vault.deposit",
            request,
            &["vault:write"],
            |state, body, context, _keyset, _config| {
                let asset_id = AssetId::from_string(body_str(body, "asset_id")?);
                let vault_id =
                    body_str_opt(body, "vault_id").unwrap_or_else(|| DEFAULT_VAULT.to_string());
                let holding = deposit_holding(
                    state,
                    context.actor.clone(),
                    asset_id,
                    vault_id,
                    body_str_opt(body, "deposit_ref"),
                    context.now,
                );
                Ok(json!({ "holding": holding }))
            },
        )
        .await
    }

    /// `vault.reserve`
    pub async fn vault_reserve(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "vault.reserve",
            request,
            &["vault:write"],
            |state, body, context, _keyset, _config| {
                let holding_id = HoldingId::from_string(body_str(body, "holding_id")?);
                let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                let holding = state
                    .vault_holdings
                    .get(&holding_id)
                    .ok_or_else(|| SwapError::not_found("vault_holding", holding_id.as_str()))?;
                if holding.owner_actor != context.actor && !context.is_privileged() {
                    return Err(SwapError::conflict_with_reason(
                        format!("holding {} is not owned by the caller", holding_id),
                        "owner_mismatch",
                    ));
                }
                let reservation_id =
                    reserve_holding(state, &holding_id, &cycle_id, context.now)?;
                Ok(json!({
                    "holding_id": holding_id,
                    "reservation_id": reservation_id,
                    "cycle_id": cycle_id,
                }))
            },
        )
        .await
    }

    /// `vault.release`
    pub async fn vault_release(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "vault.release",
            request,
            &["vault:write"],
            |state, body, context, _keyset, _config| {
                let holding_id = HoldingId::from_string(body_str(body, "holding_id")?);
                release_reservation(state, &holding_id, context.now)?;
                Ok(json!({ "holding": state.vault_holdings[&holding_id] }))
            },
        )
        .await
    }

    /// `vault.withdraw`
    pub async fn vault_withdraw(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "vault.withdraw",
            request,
            &["vault:write"],
            |state, body, context, _keyset, _config| {
                let holding_id = HoldingId::from_string(body_str(body, "holding_id")?);
                let expected_owner = if context.is_privileged() {
                    None
                } else {
                    Some(context.actor.clone())
                };
                withdraw_holding(state, &holding_id, expected_owner.as_ref(), context.now)?;
                Ok(json!({ "holding": state.vault_holdings[&holding_id] }))
            },
        )
        .await
    }

    /// `vault.get`
    pub async fn vault_get(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "vault.get",
            request,
            &["vault:read"],
            |state, body, _context, _keyset, _config| {
                let holding_id = HoldingId::from_string(body_str(body, "holding_id")?);
                let holding = state
                    .vault_holdings
                    .get(&holding_id)
                    .ok_or_else(|| SwapError::not_found("vault_holding", holding_id.as_str()))?;
                Ok(json!({ "holding": holding }))
            },
        )
        .await
    }

    /// `vault.list`
    pub async fn vault_list(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "vault.list",
            request,
            &["vault:read"],
            |state, body, context, _keyset, _config| {
                let owner = match parse_owner(body)? {
                    Some(owner) => Some(owner),
                    None if context.is_privileged() => None,
                    None => Some(context.actor.clone()),
                };
                let holdings: Vec<_> = state
                    .vault_holdings
                    .values()
                    .filter(|h| owner.as_ref().map(|o| &h.owner_actor == o).unwrap_or(true))
                    .collect();
                Ok(json!({ "holdings": holdings, "total": holdings.len() }))
            },
        )
        .await
    }

    /// `vault.snapshot`: take a proof-of-custody snapshot
    pub async fn vault_snapshot(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "vault.snapshot",
            request,
            &["vault:write"],
            |state, body, context, _keyset, _config| {
                let vault_id =
                    body_str_opt(body, "vault_id").unwrap_or_else(|| DEFAULT_VAULT.to_string());
                let snapshot = take_custody_snapshot(state, &vault_id, context.now)?;
                Ok(json!({ "snapshot": snapshot }))
            },
        )
        .await
    }

    /// `vault.prove_inclusion`
    pub async fn vault_prove_inclusion(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "vault.prove_inclusion",
            request,
            &["vault:read"],
            |state, body, _context, _keyset, _config| {
                let snapshot_id = SnapshotId::from_string(body_str(body, "snapshot_id")?);
                let holding_id = HoldingId::from_string(body_str(body, "holding_id")?);
                let proof = prove_inclusion(state, &snapshot_id, &holding_id)?;
                Ok(json!({ "proof": proof }))
            },
        )
        .await
    }
}
