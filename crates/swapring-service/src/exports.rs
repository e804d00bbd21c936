//! Export operations: signed, chain-linked journal views
//!
//! Every export runs the same pipeline (filter → continuity → page →
//! attest → checkpoint → sign → persist) over a tenancy-filtered entry
//! list. Partner-program quota enforcement is gated by policy flags.

use serde_json::{json, Value};

use swapring_auth::{AuthContext, PolicyConfig};
use swapring_export::run_export;
use swapring_store::AppState;
use swapring_types::{ActorType, ExportQuery, Result, SwapError};

use crate::{OperationRequest, ResponseEnvelope, SwapService, PARTNER_EXPORT_QUOTA};

fn parse_query(body: &Value) -> Result<ExportQuery> {
    serde_json::from_value(body.clone())
        .map_err(|e| SwapError::validation(format!("malformed export query: {}", e)))
}

fn to_values<T: serde::Serialize>(items: impl IntoIterator<Item = T>) -> Result<Vec<Value>> {
    items
        .into_iter()
        .map(|item| serde_json::to_value(item).map_err(|e| SwapError::internal(e.to_string())))
        .collect()
}

/// Quota check for partner-tenant exports, gated by
/// `SETTLEMENT_VAULT_EXPORT_PARTNER_PROGRAM_ENFORCE`
fn enforce_partner_quota(
    state: &mut AppState,
    context: &AuthContext,
    config: &PolicyConfig,
    kind: &str,
) -> Result<()> {
    if context.actor.actor_type != ActorType::Partner {
        return Ok(());
    }
    let usage = state
        .partner_program_usage
        .entry(context.actor.id.clone())
        .or_insert_with(|| swapring_types::PartnerUsage {
            partner_id: context.actor.id.clone(),
            ..Default::default()
        });
    if config.settlement_vault_export_partner_program_enforce {
        let used = usage.export_counts.get(kind).copied().unwrap_or(0);
        if used >= PARTNER_EXPORT_QUOTA {
            return Err(SwapError::QuotaExceeded {
                message: format!("{} export quota exhausted for partner", kind),
            });
        }
    }
    usage.record_export(kind, context.now);
    Ok(())
}

fn cycle_visible(state: &AppState, context: &AuthContext, cycle_id: &swapring_types::CycleId) -> bool {
    if context.is_privileged() {
        return true;
    }
    match state.tenancy.cycles.get(cycle_id) {
        Some(owner) => context.may_access_partner(owner),
        None => false,
    }
}

impl SwapService {
    /// `receipts.export`
    pub async fn receipts_export(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "receipts.export",
            request,
            &["exports:read"],
            |state, body, context, keyset, config| {
                let query = parse_query(body)?;
                enforce_partner_quota(state, context, config, "receipts")?;
                let visible: Vec<_> = state
                    .receipts
                    .iter()
                    .filter(|r| {
                        cycle_visible(state, context, &r.cycle_id)
                            || r.intent_ids.iter().any(|intent_id| {
                                state
                                    .intents
                                    .get(intent_id)
                                    .map(|i| i.actor == context.actor)
                                    .unwrap_or(false)
                            })
                    })
                    .cloned()
                    .collect();
                let entries = to_values(visible)?;
                let payload =
                    run_export(state, keyset, "receipts", entries, &query, true, context.now)?;
                Ok(json!({ "export": payload }))
            },
        )
        .await
    }

    /// `events.export`
    pub async fn events_export(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "events.export",
            request,
            &["exports:read"],
            |state, body, context, keyset, config| {
                let query = parse_query(body)?;
                enforce_partner_quota(state, context, config, "events")?;
                let visible: Vec<_> = state
                    .events
                    .iter()
                    .filter(|e| {
                        context.is_privileged()
                            || cycle_visible(
                                state,
                                context,
                                &swapring_types::CycleId::from_string(e.correlation_id.clone()),
                            )
                            || e.actor == context.actor
                    })
                    .cloned()
                    .collect();
                let entries = to_values(visible)?;
                let payload =
                    run_export(state, keyset, "events", entries, &query, true, context.now)?;
                Ok(json!({ "export": payload }))
            },
        )
        .await
    }

    /// `policyAudit.export` - the commercial policy audit journal
    pub async fn policy_audit_export(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "policyAudit.export",
            request,
            &["exports:read"],
            |state, body, context, keyset, config| {
                let query = parse_query(body)?;
                enforce_partner_quota(state, context, config, "policy_audit")?;
                let visible: Vec<_> = state
                    .policy_audit
                    .iter()
                    .filter(|entry| {
                        context.is_privileged() || context.may_access_partner(&entry.partner_id)
                    })
                    .cloned()
                    .collect();
                let entries = to_values(visible)?;
                let payload = run_export(
                    state,
                    keyset,
                    "policy_audit",
                    entries,
                    &query,
                    true,
                    context.now,
                )?;
                Ok(json!({ "export": payload }))
            },
        )
        .await
    }

    /// `partnerProgram.rollout_policy.export` - diagnostics over the
    /// rollout-policy audit journal. Freeze and checkpoint enforcement
    /// are both flag-gated.
    pub async fn rollout_policy_export(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "partnerProgram.rollout_policy.export",
            request,
            &["exports:read"],
            |state, body, context, keyset, config| {
                let query = parse_query(body)?;
                enforce_partner_quota(state, context, config, "rollout_policy_audit")?;

                if config.rollout_policy_freeze_export_enforce {
                    let target = body
                        .get("partner_id")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                        .or_else(|| context.partner_tenant.clone());
                    if let Some(partner_id) = target {
                        if state
                            .partner_program
                            .get(&partner_id)
                            .map(|p| p.frozen)
                            .unwrap_or(false)
                        {
                            return Err(SwapError::PolicyFrozen { partner_id });
                        }
                    }
                }

                let visible: Vec<_> = state
                    .rollout_policy_audit
                    .iter()
                    .filter(|entry| {
                        context.is_privileged() || context.may_access_partner(&entry.partner_id)
                    })
                    .cloned()
                    .collect();
                let entries = to_values(visible)?;
                let payload = run_export(
                    state,
                    keyset,
                    "rollout_policy_audit",
                    entries,
                    &query,
                    config.rollout_policy_diagnostics_export_checkpoint_enforce,
                    context.now,
                )?;
                Ok(json!({ "export": payload }))
            },
        )
        .await
    }

    /// `custody.export` - vault custody snapshots
    pub async fn custody_export(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "custody.export",
            request,
            &["exports:read"],
            |state, body, context, keyset, config| {
                let query = parse_query(body)?;
                enforce_partner_quota(state, context, config, "vault_custody_snapshots")?;
                let entries = to_values(state.vault_custody_snapshots.iter().cloned())?;
                let payload = run_export(
                    state,
                    keyset,
                    "vault_custody_snapshots",
                    entries,
                    &query,
                    true,
                    context.now,
                )?;
                Ok(json!({ "export": payload }))
            },
        )
        .await
    }

    /// `partnerProgram.usage.export` - per-partner usage counters
    pub async fn partner_usage_export(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "partnerProgram.usage.export",
            request,
            &["exports:read"],
            |state, body, context, keyset, _config| {
                let query = parse_query(body)?;
                let visible: Vec<_> = state
                    .partner_program_usage
                    .values()
                    .filter(|usage| {
                        context.is_privileged() || context.may_access_partner(&usage.partner_id)
                    })
                    .cloned()
                    .collect();
                let entries = to_values(visible)?;
                let payload = run_export(
                    state,
                    keyset,
                    "partner_program_usage",
                    entries,
                    &query,
                    true,
                    context.now,
                )?;
                Ok(json!({ "export": payload }))
            },
        )
        .await
    }
}
