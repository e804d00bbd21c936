//! SwapRing Outbox - append-only signed event envelopes
//!
//! Every domain event appends a signed envelope, deduplicated by a
//! deterministic `event_id` so re-emission is a no-op. Webhook
//! ingestion runs the same dedup in reverse: verify the signature,
//! then record the envelope unless its ID was already seen. The seen
//! set is part of the persisted state and survives restart.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use swapring_crypto::{attach_signature, sign_object, verify_object, KeySet, VerifyOutcome};
use swapring_store::{AppState, Store};
use swapring_types::{
    ActorRef, EventEnvelope, IngestOutcome, IngestSummary, Result, SwapError,
};

/// Deterministic event ID per domain event
pub fn deterministic_event_id(event_type: &str, resource_id: &str, sequence: u64) -> String {
    format!("evt_{}_{}_{}", event_type.replace('.', "_"), resource_id, sequence)
}

/// Sign and append an event unless its ID was already recorded.
/// Returns `true` when the event was appended.
pub fn append_event(
    state: &mut AppState,
    keyset: &KeySet,
    event_id: String,
    event_type: &str,
    correlation_id: &str,
    actor: ActorRef,
    payload: Value,
    now: DateTime<Utc>,
) -> Result<bool> {
    if state.events.iter().any(|e| e.event_id == event_id) {
        return Ok(false);
    }

    let mut envelope = EventEnvelope {
        event_id,
        event_type: event_type.to_string(),
        occurred_at: now,
        correlation_id: correlation_id.to_string(),
        actor,
        payload,
        signature: None,
    };

    let mut value = serde_json::to_value(&envelope)
        .map_err(|e| SwapError::internal(format!("event serialization: {}", e)))?;
    let signature = sign_object(keyset, &value)
        .map_err(|e| SwapError::internal(format!("event signing: {}", e)))?;
    attach_signature(&mut value, &signature)
        .map_err(|e| SwapError::internal(format!("event signing: {}", e)))?;
    envelope.signature = Some(signature);

    info!(event_id = %envelope.event_id, event_type = %envelope.event_type, "event appended");
    state.events.push(envelope);
    Ok(true)
}

/// Store-backed webhook ingestion
pub struct WebhookIngestor {
    store: Arc<Store>,
}

impl WebhookIngestor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Ingest a batch of externally delivered envelopes.
    ///
    /// Per envelope: invalid signature → rejected and NOT marked seen;
    /// known `event_id` → duplicate; otherwise the envelope is recorded
    /// and its ID marked seen.
    pub async fn ingest(&self, keyset: &KeySet, envelopes: Vec<Value>) -> Result<IngestSummary> {
        let keyset = keyset.clone();
        self.store
            .mutate(move |state| {
                let mut summary = IngestSummary::default();
                for raw in envelopes {
                    let outcome = ingest_envelope(state, &keyset, &raw);
                    match outcome {
                        IngestOutcome::Processed => summary.processed += 1,
                        IngestOutcome::Duplicate => summary.duplicates += 1,
                        IngestOutcome::Rejected => summary.rejected += 1,
                    }
                    summary.outcomes.push(outcome);
                }
                Ok(summary)
            })
            .await
    }
}

/// Verify, dedup, and record one externally delivered envelope
pub fn ingest_envelope(state: &mut AppState, keyset: &KeySet, raw: &Value) -> IngestOutcome {
    let verification = verify_object(keyset, raw);
    if verification != VerifyOutcome::Ok {
        warn!(
            error = verification.error_code().unwrap_or("unknown"),
            "webhook envelope rejected"
        );
        return IngestOutcome::Rejected;
    }

    let Ok(envelope) = serde_json::from_value::<EventEnvelope>(raw.clone()) else {
        warn!("webhook envelope failed to decode after verification");
        return IngestOutcome::Rejected;
    };

    if state.webhook_seen.contains(&envelope.event_id) {
        return IngestOutcome::Duplicate;
    }

    state.webhook_seen.insert(envelope.event_id.clone());
    state.events.push(envelope);
    IngestOutcome::Processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signed_envelope(keyset: &KeySet, event_id: &str) -> Value {
        let envelope = EventEnvelope {
            event_id: event_id.to_string(),
            event_type: "cycleProposals.delivered".to_string(),
            occurred_at: Utc::now(),
            correlation_id: "corr_1".to_string(),
            actor: ActorRef::partner("p1"),
            payload: json!({"proposal_id": "proposal_w1"}),
            signature: None,
        };
        let mut value = serde_json::to_value(&envelope).unwrap();
        let signature = sign_object(keyset, &value).unwrap();
        attach_signature(&mut value, &signature).unwrap();
        value
    }

    #[test]
    fn test_deterministic_event_id() {
        assert_eq!(
            deterministic_event_id("settlement.state_changed", "cycle_1", 2),
            "evt_settlement_state_changed_cycle_1_2"
        );
    }

    #[test]
    fn test_append_event_dedups_by_id() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let id = deterministic_event_id("intents.created", "intent_1", 0);

        let appended = append_event(
            &mut state,
            &keyset,
            id.clone(),
            "intents.created",
            "intent_1",
            ActorRef::user("u1"),
            json!({}),
            Utc::now(),
        )
        .unwrap();
        assert!(appended);

        let again = append_event(
            &mut state,
            &keyset,
            id,
            "intents.created",
            "intent_1",
            ActorRef::user("u1"),
            json!({}),
            Utc::now(),
        )
        .unwrap();
        assert!(!again);
        assert_eq!(state.events.len(), 1);
    }

    #[test]
    fn test_appended_event_signature_verifies() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        append_event(
            &mut state,
            &keyset,
            "evt_x_1_0".to_string(),
            "x",
            "1",
            ActorRef::service("core"),
            json!({"n": 1}),
            Utc::now(),
        )
        .unwrap();

        let value = serde_json::to_value(&state.events[0]).unwrap();
        assert_eq!(verify_object(&keyset, &value), VerifyOutcome::Ok);
    }

    #[tokio::test]
    async fn test_ingest_dedup_and_rejection() {
        let store = Arc::new(Store::in_memory());
        let ingestor = WebhookIngestor::new(store.clone());
        let keyset = KeySet::generate("key_1");

        let batch: Vec<Value> = (0..3)
            .map(|i| signed_envelope(&keyset, &format!("evt_hook_{}", i)))
            .collect();

        let first = ingestor.ingest(&keyset, batch.clone()).await.unwrap();
        assert_eq!(first.processed, 3);
        assert_eq!(first.duplicates, 0);

        let second = ingestor.ingest(&keyset, batch).await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.duplicates, 3);

        // Tampered payload keeps the original signature: rejected, not seen.
        let mut tampered = signed_envelope(&keyset, "evt_hook_bad");
        tampered["payload"]["proposal_id"] = json!("proposal_other");
        let third = ingestor.ingest(&keyset, vec![tampered]).await.unwrap();
        assert_eq!(third.rejected, 1);
        assert!(!store.read().await.webhook_seen.contains("evt_hook_bad"));
    }
}
