//! Webhook ingestion

use serde_json::{json, Value};

use swapring_outbox::ingest_envelope;
use swapring_types::{IngestOutcome, IngestSummary, SwapError};

use crate::{OperationRequest, ResponseEnvelope, SwapService};

impl SwapService {
    /// `webhooks.ingest`: verify → dedup → record, per envelope.
    /// Invalid signatures are rejected without polluting the seen set;
    /// duplicates are counted, not reprocessed.
    pub async fn webhooks_ingest(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "webhooks.ingest",
            request,
            &["webhooks:ingest"],
            |state, body, _context, keyset, _config| {
                let envelopes: &Vec<Value> = body
                    .get("events")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| SwapError::validation("missing required field 'events'"))?;

                let mut summary = IngestSummary::default();
                for raw in envelopes {
                    let outcome = ingest_envelope(state, keyset, raw);
                    match outcome {
                        IngestOutcome::Processed => summary.processed += 1,
                        IngestOutcome::Duplicate => summary.duplicates += 1,
                        IngestOutcome::Rejected => summary.rejected += 1,
                    }
                    summary.outcomes.push(outcome);
                }

                Ok(json!({ "summary": summary }))
            },
        )
        .await
    }
}
