//! Delegation operations: issue, introspect, revoke

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use swapring_auth::{encode_token, introspect_token};
use swapring_types::{
    ActorRef, DelegationGrant, DelegationId, Result, SwapError,
};

use crate::{body_str, OperationRequest, ResponseEnvelope, SwapService};

fn parse_timestamp(body: &Value, key: &str) -> Result<Option<DateTime<Utc>>> {
    match body.get(key).and_then(|v| v.as_str()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| SwapError::validation(format!("{} must be RFC 3339", key))),
        None => Ok(None),
    }
}

impl SwapService {
    /// `delegations.issue`: the caller becomes the principal
    pub async fn delegations_issue(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "delegations.issue",
            request,
            &["delegations:write"],
            |state, body, context, keyset, config| {
                let delegate_raw = body_str(body, "delegate_actor")?;
                let delegate_actor = ActorRef::parse(&delegate_raw).ok_or_else(|| {
                    SwapError::validation(format!("malformed delegate_actor '{}'", delegate_raw))
                })?;
                let scopes: std::collections::BTreeSet<String> = body
                    .get("scopes")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                if scopes.is_empty() {
                    return Err(SwapError::validation("delegation grant requires scopes"));
                }

                let not_before =
                    parse_timestamp(body, "not_before")?.unwrap_or(context.now);
                let expires_at = parse_timestamp(body, "expires_at")?
                    .unwrap_or_else(|| context.now + Duration::hours(1));
                if expires_at <= not_before {
                    return Err(SwapError::validation(
                        "delegation expiry must follow not_before",
                    ));
                }

                let grant = DelegationGrant {
                    delegation_id: DelegationId::new(),
                    principal_actor: context.actor.clone(),
                    delegate_actor,
                    scopes,
                    not_before,
                    expires_at,
                    revoked_at: None,
                };
                let token = encode_token(keyset, config, &grant)?;
                state
                    .delegations
                    .insert(grant.delegation_id.clone(), grant.clone());

                Ok(json!({ "delegation": grant, "token": token }))
            },
        )
        .await
    }

    /// `delegations.introspect`
    pub async fn delegations_introspect(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "delegations.introspect",
            request,
            &[],
            |state, body, context, keyset, _config| {
                let token = body_str(body, "token")?;
                let result = introspect_token(
                    keyset,
                    |id| state.delegations.get(id).cloned(),
                    &token,
                    context.now,
                );
                Ok(serde_json::to_value(result)
                    .map_err(|e| SwapError::internal(e.to_string()))?)
            },
        )
        .await
    }

    /// `delegations.revoke`: principal or admin only
    pub async fn delegations_revoke(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "delegations.revoke",
            request,
            &["delegations:write"],
            |state, body, context, _keyset, _config| {
                let delegation_id = DelegationId::from_string(body_str(body, "delegation_id")?);
                let grant = state.delegations.get_mut(&delegation_id).ok_or_else(|| {
                    SwapError::not_found("delegation", delegation_id.as_str())
                })?;
                if grant.principal_actor != context.actor && !context.is_privileged() {
                    return Err(SwapError::Forbidden {
                        reason: "only the principal may revoke a delegation".into(),
                    });
                }
                if grant.revoked_at.is_none() {
                    grant.revoked_at = Some(context.now);
                }
                Ok(json!({ "delegation": grant.clone() }))
            },
        )
        .await
    }
}
