//! SwapRing Export - filter → page → attest → checkpoint → sign
//!
//! An export is a signed, chain-linked view of one journal. The
//! attestation chain runs over the filtered entry sequence; the
//! checkpoint makes the export resumable. `export_hash` covers every
//! payload field except the signature (and itself), and the signature
//! covers everything including the hash - tampering any byte flips
//! verification. An export that fails its own post-construction
//! verification is never emitted.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use swapring_attest::{build_checkpoint, chain_segment, verify_continuity};
use swapring_crypto::{
    attach_signature, hash_canonical, sign_object, verify_object,
    verify_object_with_public_key, KeySet, VerifyOutcome,
};
use swapring_store::AppState;
use swapring_types::{
    AttestationBlock, ExportPayload, ExportQuery, ExportVerification, Result, SwapError,
};

const DEFAULT_PAGE_LIMIT: usize = 100;

/// Top-level equality filter over journal entries
pub fn apply_filter(entries: Vec<Value>, filter: Option<&Value>) -> Vec<Value> {
    let Some(Value::Object(conditions)) = filter else {
        return entries;
    };
    entries
        .into_iter()
        .filter(|entry| {
            conditions
                .iter()
                .all(|(key, expected)| entry.get(key) == Some(expected))
        })
        .collect()
}

fn entry_id(entry: &Value) -> String {
    for key in ["id", "event_id", "snapshot_id", "holding_id", "delegation_id"] {
        if let Some(id) = entry.get(key).and_then(|v| v.as_str()) {
            return id.to_string();
        }
    }
    String::new()
}

fn cursor_index(cursor: &str) -> Result<usize> {
    let (index, _) = cursor.split_once('|').ok_or_else(|| {
        SwapError::InvalidCheckpoint {
            message: format!("malformed cursor '{}'", cursor),
        }
    })?;
    index.parse().map_err(|_| SwapError::InvalidCheckpoint {
        message: format!("malformed cursor '{}'", cursor),
    })
}

/// Run one export over an already tenancy-filtered entry list.
///
/// `enforce_checkpoint` gates the continuity check for export kinds
/// whose enforcement flag is off; a resumption cursor is still honored
/// for paging either way.
pub fn run_export(
    state: &mut AppState,
    keyset: &KeySet,
    kind: &str,
    entries: Vec<Value>,
    query: &ExportQuery,
    enforce_checkpoint: bool,
    now: DateTime<Utc>,
) -> Result<ExportPayload> {
    let entries = apply_filter(entries, query.filter.as_ref());

    if enforce_checkpoint {
        verify_continuity(state.checkpoints(kind), query).map_err(|e| {
            SwapError::InvalidCheckpoint {
                message: e.to_string(),
            }
        })?;
    }

    let start = match &query.cursor_after {
        Some(cursor) => cursor_index(cursor)?,
        None => 0,
    };
    if start > entries.len() {
        return Err(SwapError::InvalidCheckpoint {
            message: format!("cursor beyond journal end ({} > {})", start, entries.len()),
        });
    }

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
    let end = (start + limit).min(entries.len());
    let page: Vec<Value> = entries[start..end].to_vec();
    let total_filtered = entries.len();
    let next_cursor = if end < total_filtered {
        Some(format!(
            "{}|{}",
            end,
            entry_id(&entries[end.saturating_sub(1)])
        ))
    } else {
        None
    };

    let (attestation_after, chain_hash) =
        chain_segment(&entries, start, end - start).map_err(|e| SwapError::internal(e.to_string()))?;
    let attestation = AttestationBlock {
        attestation_after,
        chain_hash: chain_hash.clone(),
    };

    let query_context = serde_json::json!({
        "kind": kind,
        "filter": query.filter,
    });
    let checkpoint = build_checkpoint(
        query.checkpoint_after.clone(),
        next_cursor.clone(),
        Some(chain_hash),
        query_context,
        now,
    )
    .map_err(|e| SwapError::internal(e.to_string()))?;

    // Assemble the payload, hash it, then sign hash and all.
    let mut payload_value = serde_json::json!({
        "kind": kind,
        "exported_at": now,
        "query": serde_json::to_value(query).map_err(|e| SwapError::internal(e.to_string()))?,
        "entries": page,
        "total_filtered": total_filtered,
        "next_cursor": next_cursor,
        "attestation": attestation,
        "checkpoint": checkpoint,
    });
    if next_cursor.is_none() {
        if let Some(map) = payload_value.as_object_mut() {
            map.remove("next_cursor");
        }
    }

    let export_hash =
        hash_canonical(&payload_value).map_err(|e| SwapError::internal(e.to_string()))?;
    payload_value["export_hash"] = Value::String(export_hash);
    let signature = sign_object(keyset, &payload_value)
        .map_err(|e| SwapError::internal(format!("export signing: {}", e)))?;
    attach_signature(&mut payload_value, &signature)
        .map_err(|e| SwapError::internal(format!("export signing: {}", e)))?;

    // A non-verifying export must never leave the engine.
    let verification = verify_export(keyset, &payload_value);
    if !verification.ok {
        return Err(SwapError::internal(format!(
            "constructed export failed self-verification: {:?}",
            verification.error
        )));
    }

    state
        .export_checkpoints
        .entry(kind.to_string())
        .or_default()
        .push(checkpoint.clone());

    info!(kind, page = end - start, total_filtered, "export emitted");

    serde_json::from_value(payload_value).map_err(|e| SwapError::internal(e.to_string()))
}

fn hash_portion(payload: &Value) -> Option<Value> {
    let mut unsigned = payload.clone();
    let map = unsigned.as_object_mut()?;
    map.remove("signature");
    map.remove("export_hash");
    Some(unsigned)
}

fn verification_of(outcome: VerifyOutcome) -> ExportVerification {
    match outcome {
        VerifyOutcome::Ok => ExportVerification::ok(),
        VerifyOutcome::MissingSignature => ExportVerification::failed("missing_signature"),
        VerifyOutcome::UnknownKeyId => ExportVerification::failed("unknown_key_id"),
        VerifyOutcome::KeyRevoked => ExportVerification::failed("key_revoked"),
        VerifyOutcome::BadSignature | VerifyOutcome::PayloadShape => {
            ExportVerification::failed("tampered_payload")
        }
    }
}

fn verify_hash(payload: &Value) -> Option<ExportVerification> {
    let Some(unsigned) = hash_portion(payload) else {
        return Some(ExportVerification::failed("tampered_payload"));
    };
    let Ok(expected) = hash_canonical(&unsigned) else {
        return Some(ExportVerification::failed("tampered_payload"));
    };
    match payload.get("export_hash").and_then(|v| v.as_str()) {
        Some(actual) if actual == expected => None,
        _ => Some(ExportVerification::failed("tampered_payload")),
    }
}

/// Verify an export against the current key set
pub fn verify_export(keyset: &KeySet, payload: &Value) -> ExportVerification {
    if let Some(failure) = verify_hash(payload) {
        return failure;
    }
    verification_of(verify_object(keyset, payload))
}

/// Verify an export against a caller-supplied public key
pub fn verify_export_with_public_key(
    public_key_hex: &str,
    key_id: &str,
    payload: &Value,
) -> ExportVerification {
    if let Some(failure) = verify_hash(payload) {
        return failure;
    }
    verification_of(verify_object_with_public_key(
        public_key_hex,
        Some(key_id),
        payload,
    ))
}
