//! Event outbox envelopes
//!
//! Events are append-only and deduplicated by `event_id`, which is
//! deterministic per domain event so re-emission is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorRef, SignatureEnvelope};

/// A signed outbox event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
    pub actor: ActorRef,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureEnvelope>,
}

/// Outcome of ingesting one webhook envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Processed,
    Duplicate,
    Rejected,
}

/// Summary of a webhook ingestion batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub processed: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub outcomes: Vec<IngestOutcome>,
}
