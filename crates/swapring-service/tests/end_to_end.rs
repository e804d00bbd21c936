//! End-to-end scenarios over the operation façade, each seeded from an
//! empty store.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use swapring_crypto::KeySet;
use swapring_service::{OperationRequest, SwapService};
use swapring_store::{JsonSnapshotBackend, Store};
use swapring_types::ActorRef;

fn matcher() -> ActorRef {
    ActorRef::service("matcher")
}

fn admin() -> ActorRef {
    ActorRef::admin("root")
}

async fn create_intent(service: &SwapService, user: &str, offer: &str, want: &str) -> String {
    let response = service
        .intents_create(
            OperationRequest::new(&ActorRef::user(user))
                .with_scopes(&["intents:write"])
                .with_body(json!({"offer": [offer], "want": [want]})),
        )
        .await;
    assert!(response.ok, "intent create failed: {:?}", response.body);
    response.body["intent"]["id"].as_str().unwrap().to_string()
}

async fn run_matcher(service: &SwapService, assets: &[(&str, i64)]) -> Value {
    let values: serde_json::Map<String, Value> = assets
        .iter()
        .map(|(asset, value)| (asset.to_string(), json!(value)))
        .collect();
    let response = service
        .matching_run(
            OperationRequest::new(&matcher())
                .with_scopes(&["matching:run"])
                .with_body(json!({"asset_values": values})),
        )
        .await;
    assert!(response.ok, "matching failed: {:?}", response.body);
    response.body
}

async fn accept_first_proposal(service: &SwapService, matched: &Value) -> String {
    let proposal_id = matched["proposals"][0]["id"].as_str().unwrap();
    let response = service
        .proposals_accept(
            OperationRequest::new(&ActorRef::partner("p1"))
                .with_scopes(&["cycles:accept"])
                .with_body(json!({"proposal_id": proposal_id})),
        )
        .await;
    assert!(response.ok, "accept failed: {:?}", response.body);
    response.body["cycle_id"].as_str().unwrap().to_string()
}

async fn start_settlement(service: &SwapService, cycle_id: &str, minutes: i64) {
    let response = service
        .settlement_start(
            OperationRequest::new(&ActorRef::partner("p1"))
                .with_scopes(&["settlement:write"])
                .with_body(json!({
                    "cycle_id": cycle_id,
                    "deposit_deadline_minutes": minutes,
                })),
        )
        .await;
    assert!(response.ok, "start failed: {:?}", response.body);
    assert_eq!(response.body["timeline"]["state"], "escrow.pending");
}

async fn confirm_leg(service: &SwapService, cycle_id: &str, intent_id: &str, user: &str) -> Value {
    let response = service
        .settlement_deposit_confirmed(
            OperationRequest::new(&ActorRef::user(user))
                .with_body(json!({
                    "cycle_id": cycle_id,
                    "intent_id": intent_id,
                    "deposit_ref": format!("dep_{}", intent_id),
                })),
        )
        .await;
    assert!(response.ok, "deposit failed: {:?}", response.body);
    response.body
}

// ---------------------------------------------------------------------------
// Scenario 1: two-party ring settles end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_cycle_settlement_happy_path() {
    let service = SwapService::in_memory();
    let intent_a = create_intent(&service, "u1", "a", "b").await;
    let intent_b = create_intent(&service, "u2", "b", "a").await;

    let matched = run_matcher(&service, &[("a", 100), ("b", 100)]).await;
    assert_eq!(matched["proposals"].as_array().unwrap().len(), 1);

    let cycle_id = accept_first_proposal(&service, &matched).await;
    start_settlement(&service, &cycle_id, 60).await;

    let mid = confirm_leg(&service, &cycle_id, &intent_a, "u1").await;
    assert_eq!(mid["timeline"]["state"], "escrow.pending");
    let ready = confirm_leg(&service, &cycle_id, &intent_b, "u2").await;
    assert_eq!(ready["timeline"]["state"], "escrow.ready");

    let executing = service
        .settlement_begin_execution(
            OperationRequest::new(&ActorRef::partner("p1"))
                .with_scopes(&["settlement:write"])
                .with_body(json!({"cycle_id": cycle_id})),
        )
        .await;
    assert_eq!(executing.body["timeline"]["state"], "executing");

    let completed = service
        .settlement_complete(
            OperationRequest::new(&ActorRef::partner("p1"))
                .with_scopes(&["settlement:write"])
                .with_body(json!({"cycle_id": cycle_id})),
        )
        .await;
    assert!(completed.ok, "{:?}", completed.body);
    assert_eq!(completed.body["timeline"]["state"], "completed");
    assert_eq!(completed.body["receipt"]["final_state"], "completed");

    // The receipt signature verifies against the service key set.
    let receipt: swapring_types::Receipt =
        serde_json::from_value(completed.body["receipt"].clone()).unwrap();
    let keyset = service.keyset().await;
    assert!(swapring_settlement::verify_receipt(&keyset, &receipt).is_ok());
}

// ---------------------------------------------------------------------------
// Scenario 2: three-party ring expires in the deposit window
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_cycle_expires_and_releases_holdings() {
    let service = SwapService::in_memory();
    // u1 → u2 → u3 → u1
    let intent_a = create_intent(&service, "u1", "a", "c").await;
    let _intent_b = create_intent(&service, "u2", "b", "a").await;
    let _intent_c = create_intent(&service, "u3", "c", "b").await;

    let matched = run_matcher(&service, &[("a", 100), ("b", 100), ("c", 100)]).await;
    assert_eq!(matched["proposals"][0]["legs"].as_array().unwrap().len(), 3);

    let cycle_id = accept_first_proposal(&service, &matched).await;
    start_settlement(&service, &cycle_id, 60).await;

    // Only one leg confirms before the deadline.
    confirm_leg(&service, &cycle_id, &intent_a, "u1").await;

    // Expiry before the deadline is rejected...
    let early = service
        .settlement_expire_deposit_window(
            OperationRequest::new(&ActorRef::service("sweeper"))
                .with_scopes(&["settlement:write"])
                .with_body(json!({"cycle_id": cycle_id})),
        )
        .await;
    assert_eq!(early.error_code(), Some("invalid_state_transition"));
    assert_eq!(early.reason_code(), Some("deposit_window_open"));

    // ...and honored once the window has elapsed.
    let late = (Utc::now() + Duration::minutes(61)).to_rfc3339();
    let expired = service
        .settlement_expire_deposit_window(
            OperationRequest::new(&ActorRef::service("sweeper"))
                .with_scopes(&["settlement:write"])
                .with_body(json!({"cycle_id": cycle_id, "as_of": late})),
        )
        .await;
    assert!(expired.ok, "{:?}", expired.body);
    assert_eq!(expired.body["timeline"]["state"], "expired");
    assert_eq!(expired.body["receipt"]["final_state"], "failed");
    assert_eq!(
        expired.body["receipt"]["reason_code"],
        "deposit_window_expired"
    );

    // Every reserved holding was released.
    let state = service.store().snapshot().await;
    assert!(state
        .vault_holdings
        .values()
        .all(|h| h.status == swapring_types::HoldingStatus::Released));
}

// ---------------------------------------------------------------------------
// Scenario 3: idempotent replay on vault.deposit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idempotent_replay_and_conflict() {
    let service = SwapService::in_memory();
    let user = ActorRef::user("u1");
    let request = || {
        OperationRequest::new(&user)
            .with_scopes(&["vault:write"])
            .with_idempotency_key("k1")
            .with_body(json!({"asset_id": "asset_a"}))
    };

    let first = service.vault_deposit(request()).await;
    assert!(first.ok);
    assert!(first.replayed.is_none());

    let replay = service.vault_deposit(request()).await;
    assert!(replay.ok);
    assert_eq!(replay.replayed, Some(true));
    assert_eq!(
        serde_json::to_string(&first.body).unwrap(),
        serde_json::to_string(&replay.body).unwrap(),
        "replayed body must be byte-identical"
    );

    let mut changed = request();
    changed.body["asset_id"] = json!("asset_b");
    let conflict = service.vault_deposit(changed).await;
    assert_eq!(conflict.error_code(), Some("idempotency_conflict"));

    // State unchanged by the conflicting call.
    let state = service.store().snapshot().await;
    assert_eq!(state.vault_holdings.len(), 1);
}

// ---------------------------------------------------------------------------
// Scenario 4: signed export tamper matrix
// ---------------------------------------------------------------------------

#[tokio::test]
async fn export_with_tamper() {
    let service = SwapService::in_memory();

    // Seed the policy audit journal with a few upserts.
    for tier in 0..3 {
        let response = service
            .rollout_policy_upsert(
                OperationRequest::new(&admin())
                    .with_scopes(&["partner:admin"])
                    .with_body(json!({"partner_id": "p1", "config": {"tier": tier}})),
            )
            .await;
        assert!(response.ok);
    }

    let exported = service
        .policy_audit_export(
            OperationRequest::new(&admin())
                .with_scopes(&["exports:read"])
                .with_body(json!({})),
        )
        .await;
    assert!(exported.ok, "{:?}", exported.body);
    let payload = exported.body["export"].clone();
    let keyset = service.keyset().await;

    // Pristine payload verifies.
    assert!(swapring_export::verify_export(&keyset, &payload).ok);

    // Mutating an entry field flips verification.
    let mut tampered = payload.clone();
    tampered["entries"][0]["details"]["frozen"] = json!(true);
    let result = swapring_export::verify_export(&keyset, &tampered);
    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some("tampered_payload"));

    // Fixing the hash without re-signing is still invalid.
    let mut rehashed = tampered.clone();
    let mut unsigned = rehashed.clone();
    unsigned.as_object_mut().unwrap().remove("signature");
    unsigned.as_object_mut().unwrap().remove("export_hash");
    rehashed["export_hash"] = json!(swapring_crypto::hash_canonical(&unsigned).unwrap());
    assert!(!swapring_export::verify_export(&keyset, &rehashed).ok);

    // Re-signing the full payload with the live key makes it valid
    // again, which shows the hash covers every field.
    let mut resigned = rehashed.clone();
    resigned.as_object_mut().unwrap().remove("signature");
    let signature = swapring_crypto::sign_object(&keyset, &resigned).unwrap();
    swapring_crypto::attach_signature(&mut resigned, &signature).unwrap();
    assert!(swapring_export::verify_export(&keyset, &resigned).ok);
}

// ---------------------------------------------------------------------------
// Scenario 5: delegation across rotation, revocation, and use
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delegation_token_rotation_and_settlement_use() {
    let service = SwapService::in_memory();

    // A user delegates deposit confirmation to an ops service.
    let principal = ActorRef::user("u1");
    let issued = service
        .delegations_issue(
            OperationRequest::new(&principal)
                .with_scopes(&["delegations:write"])
                .with_body(json!({
                    "delegate_actor": "service:ops",
                    "scopes": ["settlement:deposit", "read:cycles"],
                })),
        )
        .await;
    assert!(issued.ok, "{:?}", issued.body);
    let token = issued.body["token"].as_str().unwrap().to_string();

    // Set up a ring where u1 owns a leg.
    let intent_a = create_intent(&service, "u1", "a", "b").await;
    let _intent_b = create_intent(&service, "u2", "b", "a").await;
    let matched = run_matcher(&service, &[("a", 100), ("b", 100)]).await;
    let cycle_id = accept_first_proposal(&service, &matched).await;
    start_settlement(&service, &cycle_id, 60).await;

    // The delegate confirms u1's leg through the token. The ops
    // service is not the leg's from_actor, so only the delegation
    // makes this legal.
    let delegate = ActorRef::service("ops");
    let confirmed = service
        .settlement_deposit_confirmed(
            OperationRequest::new(&delegate)
                .with_token(token.clone())
                .with_body(json!({
                    "cycle_id": cycle_id,
                    "intent_id": intent_a,
                    "deposit_ref": "dep_by_delegate",
                })),
        )
        .await;
    assert!(confirmed.ok, "{:?}", confirmed.body);

    // Introspection across key rotation and revocation.
    let introspect = |token: String| {
        let service = &service;
        async move {
            let response = service
                .delegations_introspect(
                    OperationRequest::new(&ActorRef::service("checker"))
                        .with_body(json!({"token": token})),
                )
                .await;
            (
                response.body["active"].as_bool().unwrap(),
                response.body["reason"].as_str().unwrap().to_string(),
            )
        }
    };

    assert_eq!(introspect(token.clone()).await, (true, "ok".into()));

    service.rotate_signing_key("key_2").await;
    assert_eq!(introspect(token.clone()).await, (true, "ok".into()));

    service.revoke_signing_key("key_1").await.unwrap();
    let (active, reason) = introspect(token.clone()).await;
    assert!(!active);
    assert_eq!(reason, "unknown_key_id");
}

// ---------------------------------------------------------------------------
// Scenario 6: webhook dedup survives a store restart
// ---------------------------------------------------------------------------

fn temp_state_file(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "swapring_e2e_{}_{}.json",
        tag,
        std::process::id()
    ))
}

fn signed_event(keyset: &KeySet, event_id: &str) -> Value {
    let envelope = swapring_types::EventEnvelope {
        event_id: event_id.to_string(),
        event_type: "cycleProposals.delivered".to_string(),
        occurred_at: Utc::now(),
        correlation_id: "corr_hook".to_string(),
        actor: ActorRef::partner("p1"),
        payload: json!({"n": 1}),
        signature: None,
    };
    let mut value = serde_json::to_value(&envelope).unwrap();
    let signature = swapring_crypto::sign_object(keyset, &value).unwrap();
    swapring_crypto::attach_signature(&mut value, &signature).unwrap();
    value
}

#[tokio::test]
async fn webhook_dedup_survives_restart() {
    let state_file = temp_state_file("webhooks");
    let _ = std::fs::remove_file(&state_file);
    let keys = KeySet::generate("key_1");

    let ingest_request = |events: Vec<Value>| {
        OperationRequest::new(&ActorRef::service("hook-relay"))
            .with_scopes(&["webhooks:ingest"])
            .with_body(json!({"events": events}))
    };

    let batch: Vec<Value> = (0..3)
        .map(|i| signed_event(&keys, &format!("evt_hook_{}", i)))
        .collect();

    {
        let store = Store::open(Box::new(JsonSnapshotBackend::new(&state_file)))
            .await
            .unwrap();
        let service = SwapService::with_store(std::sync::Arc::new(store), keys.clone());

        let first = service.webhooks_ingest(ingest_request(batch.clone())).await;
        assert_eq!(first.body["summary"]["processed"], 3);
        assert_eq!(first.body["summary"]["duplicates"], 0);

        let second = service.webhooks_ingest(ingest_request(batch.clone())).await;
        assert_eq!(second.body["summary"]["processed"], 0);
        assert_eq!(second.body["summary"]["duplicates"], 3);

        // Tampered payload with the original signature: rejected, not seen.
        let mut tampered = signed_event(&keys, "evt_hook_bad");
        tampered["payload"]["n"] = json!(2);
        let third = service.webhooks_ingest(ingest_request(vec![tampered])).await;
        assert_eq!(third.body["summary"]["rejected"], 1);

        let proposals = service.store().snapshot().await.proposals.len();
        assert_eq!(proposals, 0, "webhook ingestion must not invent proposals");
    }

    // Restart: a fresh store over the same snapshot file.
    {
        let store = Store::open(Box::new(JsonSnapshotBackend::new(&state_file)))
            .await
            .unwrap();
        let service = SwapService::with_store(std::sync::Arc::new(store), keys.clone());

        let replayed = service.webhooks_ingest(ingest_request(batch)).await;
        assert_eq!(replayed.body["summary"]["processed"], 0);
        assert_eq!(replayed.body["summary"]["duplicates"], 3);

        let state = service.store().snapshot().await;
        assert!(!state.webhook_seen.contains("evt_hook_bad"));
        assert_eq!(state.webhook_seen.len(), 3);
    }

    let _ = std::fs::remove_file(&state_file);
}
