//! Settlement operations: the per-cycle state machine surface

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use swapring_auth::require_tenancy;
use swapring_settlement::{
    begin_execution, complete_settlement, confirm_deposit, expire_deposit_window,
    fail_settlement, start_settlement,
};
use swapring_store::AppState;
use swapring_types::{CycleId, IntentId, Result, SwapError};

use crate::{body_str, body_str_opt, OperationRequest, ResponseEnvelope, SwapService};

fn cycle_partner(state: &AppState, cycle_id: &CycleId) -> Option<String> {
    state.tenancy.cycles.get(cycle_id).cloned().or_else(|| {
        state
            .timelines
            .get(cycle_id)
            .and_then(|t| t.partner_id.clone())
    })
}

fn parse_deadline(body: &Value, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Some(raw) = body.get("deposit_deadline_at").and_then(|v| v.as_str()) {
        return raw
            .parse()
            .map_err(|_| SwapError::validation("deposit_deadline_at must be RFC 3339"));
    }
    let minutes = body
        .get("deposit_deadline_minutes")
        .and_then(|v| v.as_i64())
        .unwrap_or(60);
    if minutes <= 0 {
        return Err(SwapError::validation(
            "deposit_deadline_minutes must be positive",
        ));
    }
    Ok(now + Duration::minutes(minutes))
}

/// `as_of` lets sweepers and tests drive clock-guarded transitions
fn parse_as_of(body: &Value, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match body.get("as_of").and_then(|v| v.as_str()) {
        Some(raw) => raw
            .parse()
            .map_err(|_| SwapError::validation("as_of must be RFC 3339")),
        None => Ok(now),
    }
}

impl SwapService {
    /// `settlement.start`
    pub async fn settlement_start(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "settlement.start",
            request,
            &["settlement:write"],
            |state, body, context, keyset, config| {
                let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                require_tenancy(
                    config,
                    context,
                    cycle_partner(state, &cycle_id).as_deref(),
                    "cycle",
                )?;
                let deadline = parse_deadline(body, context.now)?;
                let timeline = start_settlement(
                    state,
                    keyset,
                    &cycle_id,
                    deadline,
                    &context.actor,
                    context.now,
                )?;
                Ok(json!({ "timeline": timeline }))
            },
        )
        .await
    }

    /// `settlement.deposit_confirmed`
    pub async fn settlement_deposit_confirmed(
        &self,
        request: OperationRequest,
    ) -> ResponseEnvelope {
        self.execute(
            "settlement.deposit_confirmed",
            request,
            &[],
            |state, body, context, keyset, config| {
                let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                let intent_id = IntentId::from_string(body_str(body, "intent_id")?);
                let deposit_ref = body_str(body, "deposit_ref")?;

                let leg_owner = state
                    .timelines
                    .get(&cycle_id)
                    .and_then(|t| t.leg_for_intent(&intent_id))
                    .map(|l| l.from_actor.clone());

                // A delegate may confirm only for the principal that
                // owns the leg, and only with settlement:deposit.
                let delegated_deposit = context
                    .delegation
                    .as_ref()
                    .map(|grant| {
                        context.scopes.contains("settlement:deposit")
                            && leg_owner.as_ref() == Some(&grant.principal_actor)
                    })
                    .unwrap_or(false);

                // The leg's own from_actor (or its delegate) needs no
                // tenancy standing; anyone else must clear the
                // partner wall.
                if leg_owner.as_ref() != Some(&context.actor) && !delegated_deposit {
                    require_tenancy(
                        config,
                        context,
                        cycle_partner(state, &cycle_id).as_deref(),
                        "cycle",
                    )?;
                }
                let (timeline, leg_replayed) = confirm_deposit(
                    state,
                    keyset,
                    &cycle_id,
                    &intent_id,
                    &deposit_ref,
                    &context.actor,
                    delegated_deposit,
                    context.now,
                )?;
                Ok(json!({ "timeline": timeline, "leg_replayed": leg_replayed }))
            },
        )
        .await
    }

    /// `settlement.begin_execution`
    pub async fn settlement_begin_execution(
        &self,
        request: OperationRequest,
    ) -> ResponseEnvelope {
        self.execute(
            "settlement.begin_execution",
            request,
            &["settlement:write"],
            |state, body, context, keyset, config| {
                let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                require_tenancy(
                    config,
                    context,
                    cycle_partner(state, &cycle_id).as_deref(),
                    "cycle",
                )?;
                let timeline =
                    begin_execution(state, keyset, &cycle_id, &context.actor, context.now)?;
                Ok(json!({ "timeline": timeline }))
            },
        )
        .await
    }

    /// `settlement.complete`
    pub async fn settlement_complete(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "settlement.complete",
            request,
            &["settlement:write"],
            |state, body, context, keyset, config| {
                let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                require_tenancy(
                    config,
                    context,
                    cycle_partner(state, &cycle_id).as_deref(),
                    "cycle",
                )?;
                let (timeline, receipt) =
                    complete_settlement(state, keyset, &cycle_id, &context.actor, context.now)?;
                Ok(json!({ "timeline": timeline, "receipt": receipt }))
            },
        )
        .await
    }

    /// `settlement.fail`
    pub async fn settlement_fail(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "settlement.fail",
            request,
            &["settlement:write"],
            |state, body, context, keyset, config| {
                let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                let reason_code =
                    body_str_opt(body, "reason_code").unwrap_or_else(|| "execution_failed".into());
                require_tenancy(
                    config,
                    context,
                    cycle_partner(state, &cycle_id).as_deref(),
                    "cycle",
                )?;
                let (timeline, receipt) = fail_settlement(
                    state,
                    keyset,
                    &cycle_id,
                    &reason_code,
                    &context.actor,
                    context.now,
                )?;
                Ok(json!({ "timeline": timeline, "receipt": receipt }))
            },
        )
        .await
    }

    /// `settlement.expire_deposit_window`
    pub async fn settlement_expire_deposit_window(
        &self,
        request: OperationRequest,
    ) -> ResponseEnvelope {
        self.execute(
            "settlement.expire_deposit_window",
            request,
            &["settlement:write"],
            |state, body, context, keyset, config| {
                let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                require_tenancy(
                    config,
                    context,
                    cycle_partner(state, &cycle_id).as_deref(),
                    "cycle",
                )?;
                let as_of = parse_as_of(body, context.now)?;
                let (timeline, receipt) =
                    expire_deposit_window(state, keyset, &cycle_id, &context.actor, as_of)?;
                Ok(json!({ "timeline": timeline, "receipt": receipt }))
            },
        )
        .await
    }

    /// `settlement.get_timeline`
    pub async fn settlement_get_timeline(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "settlement.get_timeline",
            request,
            &["cycles:read"],
            |state, body, context, _keyset, config| {
                let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                require_tenancy(
                    config,
                    context,
                    cycle_partner(state, &cycle_id).as_deref(),
                    "cycle",
                )?;
                let timeline = state
                    .timelines
                    .get(&cycle_id)
                    .ok_or_else(|| SwapError::not_found("timeline", cycle_id.as_str()))?;
                Ok(json!({ "timeline": timeline }))
            },
        )
        .await
    }

    /// `receipts.get`
    pub async fn receipts_get(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "receipts.get",
            request,
            &["cycles:read"],
            |state, body, context, _keyset, config| {
                let receipt = if let Some(receipt_id) = body_str_opt(body, "receipt_id") {
                    state.receipt(&receipt_id)
                } else {
                    let cycle_id = CycleId::from_string(body_str(body, "cycle_id")?);
                    state.receipt_for_cycle(&cycle_id)
                };
                let receipt = receipt.ok_or_else(|| {
                    SwapError::not_found("receipt", body.to_string())
                })?;
                require_tenancy(
                    config,
                    context,
                    cycle_partner(state, &receipt.cycle_id).as_deref(),
                    "receipt",
                )?;
                Ok(json!({ "receipt": receipt }))
            },
        )
        .await
    }
}
