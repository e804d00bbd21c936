//! Partner program operations: rollout policy upsert + audit

use serde_json::json;

use swapring_auth::require_tenancy;
use swapring_types::{
    ActorType, AuditEntryId, PolicyAuditEntry, RolloutPolicy, SwapError,
};

use crate::{body_str_opt, OperationRequest, ResponseEnvelope, SwapService};

impl SwapService {
    /// `partnerProgram.rollout_policy.upsert`
    ///
    /// Versioned per partner; every change lands in both the
    /// commercial policy audit and the rollout-policy audit journal.
    /// Upserting a frozen policy fails `policy_frozen`; only a
    /// privileged actor may freeze or unfreeze.
    pub async fn rollout_policy_upsert(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "partnerProgram.rollout_policy.upsert",
            request,
            &["partner:admin"],
            |state, body, context, _keyset, config| {
                let partner_id = body_str_opt(body, "partner_id")
                    .or_else(|| context.partner_tenant.clone())
                    .ok_or_else(|| SwapError::validation("partner_id is required"))?;
                require_tenancy(config, context, Some(&partner_id), "rollout_policy")?;

                let freeze = body.get("freeze").and_then(|v| v.as_bool());
                if freeze.is_some()
                    && !context.is_privileged()
                    && context.actor.actor_type != ActorType::Admin
                {
                    return Err(SwapError::Forbidden {
                        reason: "only privileged actors may change freeze state".into(),
                    });
                }
                let policy_config = body.get("config").cloned().unwrap_or_else(|| json!({}));

                let existing = state.partner_program.get(&partner_id);
                if existing.map(|p| p.frozen).unwrap_or(false) && freeze != Some(false) {
                    return Err(SwapError::PolicyFrozen {
                        partner_id: partner_id.clone(),
                    });
                }
                let version = existing.map(|p| p.version + 1).unwrap_or(1);

                let policy = RolloutPolicy {
                    partner_id: partner_id.clone(),
                    version,
                    frozen: freeze.unwrap_or(false),
                    config: policy_config,
                    updated_by: context.actor.clone(),
                    updated_at: context.now,
                };
                state
                    .partner_program
                    .insert(partner_id.clone(), policy.clone());

                let action = match freeze {
                    Some(true) => "rollout_policy.freeze",
                    Some(false) => "rollout_policy.unfreeze",
                    None => "rollout_policy.upsert",
                };
                let audit = PolicyAuditEntry {
                    id: AuditEntryId::new(),
                    partner_id: partner_id.clone(),
                    action: action.to_string(),
                    policy_version: version,
                    actor: context.actor.clone(),
                    occurred_at: context.now,
                    details: json!({"frozen": policy.frozen}),
                };
                state.policy_audit.push(audit.clone());
                state.rollout_policy_audit.push(audit);

                Ok(json!({ "policy": policy }))
            },
        )
        .await
    }

    /// `partnerProgram.rollout_policy.get`
    pub async fn rollout_policy_get(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "partnerProgram.rollout_policy.get",
            request,
            &["partner:read"],
            |state, body, context, _keyset, config| {
                let partner_id = body_str_opt(body, "partner_id")
                    .or_else(|| context.partner_tenant.clone())
                    .ok_or_else(|| SwapError::validation("partner_id is required"))?;
                require_tenancy(config, context, Some(&partner_id), "rollout_policy")?;
                let policy = state
                    .partner_program
                    .get(&partner_id)
                    .ok_or_else(|| SwapError::not_found("rollout_policy", &partner_id))?;
                Ok(json!({ "policy": policy }))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapring_types::ActorRef;

    #[tokio::test]
    async fn test_upsert_versions_and_audits() {
        let service = SwapService::in_memory();
        let admin = ActorRef::admin("root");

        for i in 0..2 {
            let response = service
                .rollout_policy_upsert(
                    OperationRequest::new(&admin)
                        .with_scopes(&["partner:admin"])
                        .with_body(json!({
                            "partner_id": "p1",
                            "config": {"tier": i},
                        })),
                )
                .await;
            assert!(response.ok, "{:?}", response.body);
        }

        let state = service.store().snapshot().await;
        assert_eq!(state.partner_program["p1"].version, 2);
        assert_eq!(state.policy_audit.len(), 2);
        assert_eq!(state.rollout_policy_audit.len(), 2);
    }

    #[tokio::test]
    async fn test_frozen_policy_rejects_upsert() {
        let service = SwapService::in_memory();
        let admin = ActorRef::admin("root");

        service
            .rollout_policy_upsert(
                OperationRequest::new(&admin)
                    .with_scopes(&["partner:admin"])
                    .with_body(json!({"partner_id": "p1", "freeze": true})),
            )
            .await;

        let rejected = service
            .rollout_policy_upsert(
                OperationRequest::new(&admin)
                    .with_scopes(&["partner:admin"])
                    .with_body(json!({"partner_id": "p1", "config": {"tier": 9}})),
            )
            .await;
        assert_eq!(rejected.error_code(), Some("policy_frozen"));

        // Unfreezing re-opens the policy.
        let unfrozen = service
            .rollout_policy_upsert(
                OperationRequest::new(&admin)
                    .with_scopes(&["partner:admin"])
                    .with_body(json!({"partner_id": "p1", "freeze": false})),
            )
            .await;
        assert!(unfrozen.ok);
    }

    #[tokio::test]
    async fn test_partner_cannot_touch_other_tenant() {
        let service = SwapService::in_memory();
        let partner = ActorRef::partner("p1");
        let response = service
            .rollout_policy_upsert(
                OperationRequest::new(&partner)
                    .with_scopes(&["partner:admin"])
                    .with_body(json!({"partner_id": "p2"})),
            )
            .await;
        assert_eq!(response.error_code(), Some("tenancy_forbidden"));
    }
}
