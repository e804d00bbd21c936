//! Attestation chains and export checkpoints
//!
//! Every append-only journal carries a hash chain:
//! `h0 = ""`, `h_i = sha256_hex(canonical(entry_i) || h_{i-1})`.
//! Exports record the chain hash before and after the included page;
//! checkpoints make an export resumable and self-verifying.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use swapring_crypto::sha256_hex;
use swapring_types::{ExportCheckpoint, ExportQuery};

#[derive(Debug, Clone, Error)]
pub enum AttestError {
    #[error("Canonicalization failed: {0}")]
    Canonical(#[from] swapring_canonical::CanonicalError),

    #[error("Checkpoint continuity mismatch: {0}")]
    Continuity(String),
}

pub type Result<T> = std::result::Result<T, AttestError>;

/// Chain hash of one entry given the previous head
pub fn chain_step(entry: &Value, previous_head: &str) -> Result<String> {
    let mut bytes = swapring_canonical::canonical_bytes(entry)?;
    bytes.extend_from_slice(previous_head.as_bytes());
    Ok(sha256_hex(&bytes))
}

/// All intermediate chain heads for a journal, one per entry
pub fn chain_heads(entries: &[Value]) -> Result<Vec<String>> {
    let mut heads = Vec::with_capacity(entries.len());
    let mut head = String::new();
    for entry in entries {
        head = chain_step(entry, &head)?;
        heads.push(head.clone());
    }
    Ok(heads)
}

/// The chain head after the whole journal ("" for an empty journal)
pub fn chain_head(entries: &[Value]) -> Result<String> {
    Ok(chain_heads(entries)?.pop().unwrap_or_default())
}

/// Attestation span for a page of `len` entries starting at `start`
/// within the full journal: `(attestation_after, chain_hash)` where
/// `attestation_after` is `None` at genesis.
pub fn chain_segment(
    entries: &[Value],
    start: usize,
    len: usize,
) -> Result<(Option<String>, String)> {
    let heads = chain_heads(entries)?;
    let after = if start == 0 {
        None
    } else {
        Some(heads[start - 1].clone())
    };
    let end = (start + len).min(entries.len());
    let chain_hash = if end == 0 {
        String::new()
    } else {
        heads[end - 1].clone()
    };
    Ok((after, chain_hash))
}

/// Build a checkpoint row; `checkpoint_hash` covers every prior field.
pub fn build_checkpoint(
    checkpoint_after: Option<String>,
    next_cursor: Option<String>,
    attestation_chain_hash: Option<String>,
    query_context: Value,
    exported_at: DateTime<Utc>,
) -> Result<ExportCheckpoint> {
    let hashable = serde_json::json!({
        "checkpoint_after": checkpoint_after,
        "next_cursor": next_cursor,
        "attestation_chain_hash": attestation_chain_hash,
        "query_context": query_context,
        "exported_at": exported_at,
    });
    let checkpoint_hash = sha256_hex(&swapring_canonical::canonical_bytes(&hashable)?);
    Ok(ExportCheckpoint {
        checkpoint_after,
        next_cursor,
        attestation_chain_hash,
        query_context,
        exported_at,
        checkpoint_hash,
    })
}

/// Recompute a checkpoint's self-hash and compare
pub fn verify_checkpoint_hash(checkpoint: &ExportCheckpoint) -> Result<bool> {
    let rebuilt = build_checkpoint(
        checkpoint.checkpoint_after.clone(),
        checkpoint.next_cursor.clone(),
        checkpoint.attestation_chain_hash.clone(),
        checkpoint.query_context.clone(),
        checkpoint.exported_at,
    )?;
    Ok(rebuilt.checkpoint_hash == checkpoint.checkpoint_hash)
}

/// Verify a resumption triple against saved checkpoint rows. Every
/// `*_after` value the caller provides must match one saved row's
/// continuation fields; a partial or unmatched triple is rejected.
pub fn verify_continuity<'a>(
    saved: &'a [ExportCheckpoint],
    query: &ExportQuery,
) -> std::result::Result<Option<&'a ExportCheckpoint>, AttestError> {
    if !query.is_resumption() {
        return Ok(None);
    }
    let matched = saved.iter().rev().find(|row| {
        let checkpoint_ok = match &query.checkpoint_after {
            Some(cp) => &row.checkpoint_hash == cp,
            None => false,
        };
        let cursor_ok = query.cursor_after == row.next_cursor;
        let attestation_ok = query.attestation_after == row.attestation_chain_hash;
        checkpoint_ok && cursor_ok && attestation_ok
    });
    match matched {
        Some(row) => Ok(Some(row)),
        None => Err(AttestError::Continuity(
            "resumption cursor does not match any saved checkpoint".into(),
        )),
    }
}
