//! Intent operations: create, cancel, list

use serde_json::json;

use swapring_outbox::{append_event, deterministic_event_id};
use swapring_types::{
    ActorType, AssetId, IntentId, IntentStatus, SwapError, SwapIntent, ValueBand,
};

use crate::{body_str, body_str_list, body_str_opt, OperationRequest, ResponseEnvelope, SwapService};

impl SwapService {
    /// `intents.create`
    pub async fn intents_create(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "intents.create",
            request,
            &["intents:write"],
            |state, body, context, keyset, _config| {
                let offer = body_str_list(body, "offer")?;
                let want = body_str_list(body, "want")?;
                if offer.is_empty() || want.is_empty() {
                    return Err(SwapError::validation("offer and want must be non-empty"));
                }
                let value_band = match body.get("value_band") {
                    Some(band) => ValueBand::new(
                        band.get("min_value").and_then(|v| v.as_i64()).unwrap_or(0),
                        band.get("max_value")
                            .and_then(|v| v.as_i64())
                            .unwrap_or(i64::MAX),
                    ),
                    None => ValueBand::new(0, i64::MAX),
                };
                if value_band.max_value < value_band.min_value {
                    return Err(SwapError::validation("value_band bounds are inverted"));
                }

                let partner_id = body_str_opt(body, "partner_id").or_else(|| {
                    (context.actor.actor_type == ActorType::Partner)
                        .then(|| context.actor.id.clone())
                });

                let intent = SwapIntent {
                    id: IntentId::new(),
                    actor: context.actor.clone(),
                    offer: offer.into_iter().map(AssetId::from_string).collect(),
                    want: want.into_iter().map(AssetId::from_string).collect(),
                    value_band,
                    status: IntentStatus::Active,
                    partner_id,
                    created_at: context.now,
                    updated_at: context.now,
                };
                state.intents.insert(intent.id.clone(), intent.clone());

                append_event(
                    state,
                    keyset,
                    deterministic_event_id("intents.created", intent.id.as_str(), 0),
                    "intents.created",
                    intent.id.as_str(),
                    context.actor.clone(),
                    json!({"intent_id": intent.id}),
                    context.now,
                )?;

                Ok(json!({ "intent": intent }))
            },
        )
        .await
    }

    /// `intents.cancel`
    pub async fn intents_cancel(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "intents.cancel",
            request,
            &["intents:write"],
            |state, body, context, keyset, _config| {
                let intent_id = IntentId::from_string(body_str(body, "intent_id")?);
                let intent = state
                    .intents
                    .get_mut(&intent_id)
                    .ok_or_else(|| SwapError::not_found("intent", intent_id.as_str()))?;

                if intent.actor != context.actor && !context.is_privileged() {
                    return Err(SwapError::Forbidden {
                        reason: "only the intent owner may cancel".into(),
                    });
                }
                match intent.status {
                    IntentStatus::Active => {}
                    IntentStatus::Cancelled => {
                        return Err(SwapError::conflict("intent is already cancelled"));
                    }
                    _ => {
                        return Err(SwapError::conflict_with_reason(
                            "intent is locked into a cycle",
                            "intent_unavailable",
                        ));
                    }
                }
                intent.status = IntentStatus::Cancelled;
                intent.updated_at = context.now;
                let snapshot = intent.clone();

                append_event(
                    state,
                    keyset,
                    deterministic_event_id("intents.cancelled", intent_id.as_str(), 0),
                    "intents.cancelled",
                    intent_id.as_str(),
                    context.actor.clone(),
                    json!({"intent_id": intent_id}),
                    context.now,
                )?;

                Ok(json!({ "intent": snapshot }))
            },
        )
        .await
    }

    /// `intents.list`
    pub async fn intents_list(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "intents.list",
            request,
            &["intents:read"],
            |state, body, context, _keyset, _config| {
                let status_filter = body_str_opt(body, "status");
                let intents: Vec<&SwapIntent> = state
                    .intents
                    .values()
                    .filter(|i| {
                        // Users see their own; partners their tenancy; admins all.
                        if context.is_privileged() {
                            return true;
                        }
                        match context.actor.actor_type {
                            ActorType::Partner => {
                                i.partner_id.as_deref() == Some(context.actor.id.as_str())
                            }
                            _ => i.actor == context.actor,
                        }
                    })
                    .filter(|i| match &status_filter {
                        Some(status) => {
                            serde_json::to_value(i.status)
                                .map(|v| v.as_str() == Some(status.as_str()))
                                .unwrap_or(false)
                        }
                        None => true,
                    })
                    .collect();
                Ok(json!({ "intents": intents, "total": intents.len() }))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use swapring_types::ActorRef;

    fn create_body() -> Value {
        json!({
            "offer": ["asset_a"],
            "want": ["asset_b"],
            "value_band": {"min_value": 10, "max_value": 100},
        })
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let service = SwapService::in_memory();
        let user = ActorRef::user("u1");

        let response = service
            .intents_create(
                OperationRequest::new(&user)
                    .with_scopes(&["intents:write"])
                    .with_body(create_body()),
            )
            .await;
        assert!(response.ok, "{:?}", response.body);

        let listed = service
            .intents_list(
                OperationRequest::new(&user)
                    .with_scopes(&["intents:read"])
                    .with_body(json!({})),
            )
            .await;
        assert!(listed.ok);
        assert_eq!(listed.body["total"], 1);
    }

    #[tokio::test]
    async fn test_create_validates_assets() {
        let service = SwapService::in_memory();
        let user = ActorRef::user("u1");
        let response = service
            .intents_create(
                OperationRequest::new(&user)
                    .with_scopes(&["intents:write"])
                    .with_body(json!({"offer": [], "want": ["b"]})),
            )
            .await;
        assert!(!response.ok);
        assert_eq!(response.error_code(), Some("validation_error"));
    }

    #[tokio::test]
    async fn test_cancel_requires_owner() {
        let service = SwapService::in_memory();
        let owner = ActorRef::user("u1");
        let created = service
            .intents_create(
                OperationRequest::new(&owner)
                    .with_scopes(&["intents:write"])
                    .with_body(create_body()),
            )
            .await;
        let intent_id = created.body["intent"]["id"].as_str().unwrap().to_string();

        let other = ActorRef::user("u2");
        let denied = service
            .intents_cancel(
                OperationRequest::new(&other)
                    .with_scopes(&["intents:write"])
                    .with_body(json!({"intent_id": intent_id})),
            )
            .await;
        assert_eq!(denied.error_code(), Some("forbidden"));

        let cancelled = service
            .intents_cancel(
                OperationRequest::new(&owner)
                    .with_scopes(&["intents:write"])
                    .with_body(json!({"intent_id": created.body["intent"]["id"]})),
            )
            .await;
        assert!(cancelled.ok);
    }

    #[tokio::test]
    async fn test_missing_scope_is_forbidden() {
        let service = SwapService::in_memory();
        let user = ActorRef::user("u1");
        let response = service
            .intents_create(OperationRequest::new(&user).with_body(create_body()))
            .await;
        assert!(!response.ok);
        assert_eq!(response.error_code(), Some("forbidden"));
    }
}
