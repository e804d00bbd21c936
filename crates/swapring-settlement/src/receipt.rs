//! Receipt sealing
//!
//! A receipt is built from the terminal timeline, signed over its
//! canonical form minus the signature, appended to the receipts
//! journal, and announced on the outbox. Receipts are immutable after
//! sealing.

use chrono::{DateTime, Utc};

use swapring_crypto::{attach_signature, sign_object, verify_object, KeySet, VerifyOutcome};
use swapring_store::AppState;
use swapring_types::{
    ActorRef, Receipt, ReceiptFinalState, ReceiptId, Result, SwapError, Timeline,
};

use crate::emit_cycle_event;

/// Build, sign, journal, and announce the terminal receipt for a cycle
pub(crate) fn seal_receipt(
    state: &mut AppState,
    keyset: &KeySet,
    timeline: &Timeline,
    final_state: ReceiptFinalState,
    reason_code: Option<&str>,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<Receipt> {
    // One receipt per cycle; the derived ID collides only if the cycle
    // already sealed, which the state machine rules out.
    let id = if state
        .receipts
        .iter()
        .any(|r| r.id == Receipt::id_for_cycle(&timeline.cycle_id))
    {
        ReceiptId::new()
    } else {
        Receipt::id_for_cycle(&timeline.cycle_id)
    };

    let mut receipt = Receipt {
        id,
        cycle_id: timeline.cycle_id.clone(),
        final_state,
        intent_ids: timeline.legs.iter().map(|l| l.intent_id.clone()).collect(),
        asset_ids: timeline.legs.iter().map(|l| l.asset_id.clone()).collect(),
        reason_code: reason_code.map(|s| s.to_string()),
        created_at: now,
        transparency: Some(serde_json::json!({
            "proposal_id": timeline.proposal_id,
            "leg_count": timeline.legs.len(),
        })),
        signature: None,
    };

    let mut value = serde_json::to_value(&receipt)
        .map_err(|e| SwapError::internal(format!("receipt serialization: {}", e)))?;
    let signature = sign_object(keyset, &value)
        .map_err(|e| SwapError::internal(format!("receipt signing: {}", e)))?;
    attach_signature(&mut value, &signature)
        .map_err(|e| SwapError::internal(format!("receipt signing: {}", e)))?;
    receipt.signature = Some(signature);

    state.receipts.push(receipt.clone());

    emit_cycle_event(
        state,
        keyset,
        &timeline.cycle_id,
        "settlement.receipt_sealed",
        actor,
        serde_json::json!({
            "receipt_id": receipt.id,
            "final_state": receipt.final_state,
        }),
        now,
    )?;

    Ok(receipt)
}

/// Verify a receipt's embedded signature against the key set
pub fn verify_receipt(keyset: &KeySet, receipt: &Receipt) -> VerifyOutcome {
    match serde_json::to_value(receipt) {
        Ok(value) => verify_object(keyset, &value),
        Err(_) => VerifyOutcome::PayloadShape,
    }
}
