//! SwapRing Settlement - the per-cycle state machine
//!
//! `initial → escrow.pending → escrow.ready → executing →
//! completed | failed | expired`. Transitions are explicit; anything
//! unlisted fails with `invalid_state_transition`. Terminal
//! transitions build, sign, and journal a receipt, then append outbox
//! events in the order: state change → terminal receipt.
//!
//! Everything here operates on `&mut AppState` so the service façade
//! can run each operation as one store transaction.

pub mod proposal;
pub mod receipt;

pub use proposal::*;
pub use receipt::*;

use chrono::{DateTime, Utc};
use tracing::info;

use swapring_crypto::KeySet;
use swapring_outbox::{append_event, deterministic_event_id};
use swapring_store::AppState;
use swapring_types::{
    ActorRef, CycleId, IntentId, IntentStatus, LegStatus, ReceiptFinalState, Result, SwapError,
    Timeline, TimelineState,
};
use swapring_vault::{deposit_holding, release_reservation, reserve_holding, withdraw_holding};

/// Reason code attached to expiry-driven failures
pub const REASON_DEPOSIT_WINDOW_EXPIRED: &str = "deposit_window_expired";

fn timeline_mut<'a>(state: &'a mut AppState, cycle_id: &CycleId) -> Result<&'a mut Timeline> {
    state
        .timelines
        .get_mut(cycle_id)
        .ok_or_else(|| SwapError::not_found("timeline", cycle_id.as_str()))
}

/// Reject any operation against a terminal or unexpected state
fn guard_state(timeline: &Timeline, expected: TimelineState, operation: &str) -> Result<()> {
    if timeline.state == expected {
        return Ok(());
    }
    let reason = if timeline.state.is_terminal() {
        Some("terminal_state")
    } else {
        None
    };
    Err(SwapError::invalid_transition(
        timeline.state.as_str(),
        operation,
        reason,
    ))
}

pub(crate) fn emit_cycle_event(
    state: &mut AppState,
    keyset: &KeySet,
    cycle_id: &CycleId,
    event_type: &str,
    actor: &ActorRef,
    payload: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<()> {
    let sequence = state
        .events
        .iter()
        .filter(|e| e.correlation_id == cycle_id.as_str())
        .count() as u64;
    let event_id = deterministic_event_id(event_type, cycle_id.as_str(), sequence);
    append_event(
        state,
        keyset,
        event_id,
        event_type,
        cycle_id.as_str(),
        actor.clone(),
        payload,
        now,
    )?;
    Ok(())
}

fn emit_state_change(
    state: &mut AppState,
    keyset: &KeySet,
    cycle_id: &CycleId,
    from: TimelineState,
    to: TimelineState,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<()> {
    emit_cycle_event(
        state,
        keyset,
        cycle_id,
        "settlement.state_changed",
        actor,
        serde_json::json!({
            "cycle_id": cycle_id,
            "from": from.as_str(),
            "to": to.as_str(),
        }),
        now,
    )
}

/// `initial → escrow.pending`: create the timeline for an accepted,
/// unexpired proposal.
pub fn start_settlement(
    state: &mut AppState,
    keyset: &KeySet,
    cycle_id: &CycleId,
    deposit_deadline_at: DateTime<Utc>,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<Timeline> {
    if state.timelines.contains_key(cycle_id) {
        return Err(SwapError::conflict(format!(
            "timeline already exists for {}",
            cycle_id
        )));
    }
    let proposal_id = proposal_for_cycle(state, cycle_id)?;
    let proposal = state
        .proposals
        .get(&proposal_id)
        .ok_or_else(|| SwapError::not_found("proposal", proposal_id.as_str()))?
        .clone();

    if proposal.status != swapring_types::ProposalStatus::Accepted {
        return Err(SwapError::invalid_transition(
            TimelineState::Initial.as_str(),
            "start",
            Some("proposal_not_accepted"),
        ));
    }
    if proposal.is_expired(now) {
        return Err(SwapError::invalid_transition(
            TimelineState::Initial.as_str(),
            "start",
            Some("proposal_expired"),
        ));
    }

    let timeline = Timeline {
        cycle_id: cycle_id.clone(),
        proposal_id: proposal.id.clone(),
        state: TimelineState::EscrowPending,
        legs: proposal
            .legs
            .iter()
            .map(|leg| swapring_types::TimelineLeg {
                intent_id: leg.intent_id.clone(),
                from_actor: leg.from_actor.clone(),
                to_actor: leg.to_actor.clone(),
                asset_id: leg.asset_id.clone(),
                status: LegStatus::Pending,
                vault_holding_id: None,
                vault_reservation_id: None,
                deposit_ref: None,
            })
            .collect(),
        deposit_deadline_at: Some(deposit_deadline_at),
        partner_id: proposal.partner_id.clone(),
        created_at: now,
        updated_at: now,
    };

    state.timelines.insert(cycle_id.clone(), timeline.clone());
    emit_state_change(
        state,
        keyset,
        cycle_id,
        TimelineState::Initial,
        TimelineState::EscrowPending,
        actor,
        now,
    )?;
    info!(cycle_id = %cycle_id, "settlement started");
    Ok(timeline)
}

/// Confirm one leg's deposit. The confirming actor must be the leg's
/// `from_actor`, or a delegate holding `settlement:deposit`
/// (`delegated_deposit` is resolved by the caller from the auth
/// context). A repeat confirmation with the same `deposit_ref` is a
/// no-op replay; the last pending leg flips the timeline to
/// `escrow.ready`.
pub fn confirm_deposit(
    state: &mut AppState,
    keyset: &KeySet,
    cycle_id: &CycleId,
    intent_id: &IntentId,
    deposit_ref: &str,
    confirming_actor: &ActorRef,
    delegated_deposit: bool,
    now: DateTime<Utc>,
) -> Result<(Timeline, bool)> {
    let timeline = timeline_mut(state, cycle_id)?;
    guard_state(timeline, TimelineState::EscrowPending, "deposit_confirmed")?;

    let leg_index = timeline
        .legs
        .iter()
        .position(|l| &l.intent_id == intent_id)
        .ok_or_else(|| SwapError::not_found("timeline_leg", intent_id.as_str()))?;

    let leg = &timeline.legs[leg_index];
    if &leg.from_actor != confirming_actor && !delegated_deposit {
        return Err(SwapError::Forbidden {
            reason: format!("{} is not the depositing actor for this leg", confirming_actor),
        });
    }

    match leg.status {
        LegStatus::Pending => {}
        LegStatus::Deposited => {
            // Same ref replays; a different ref is a real conflict.
            return if leg.deposit_ref.as_deref() == Some(deposit_ref) {
                Ok((timeline.clone(), true))
            } else {
                Err(SwapError::conflict_with_reason(
                    format!("leg {} already confirmed with another reference", intent_id),
                    "deposit_ref_mismatch",
                ))
            };
        }
        _ => {
            return Err(SwapError::invalid_transition(
                timeline.state.as_str(),
                "deposit_confirmed",
                None,
            ));
        }
    }

    let from_actor = leg.from_actor.clone();
    let asset_id = leg.asset_id.clone();

    let holding = deposit_holding(
        state,
        from_actor.clone(),
        asset_id,
        "vault_settlement".to_string(),
        Some(deposit_ref.to_string()),
        now,
    );
    let reservation_id = reserve_holding(state, &holding.holding_id, cycle_id, now)?;

    let timeline = timeline_mut(state, cycle_id)?;
    let leg = &mut timeline.legs[leg_index];
    leg.status = LegStatus::Deposited;
    leg.vault_holding_id = Some(holding.holding_id.clone());
    leg.vault_reservation_id = Some(reservation_id);
    leg.deposit_ref = Some(deposit_ref.to_string());
    timeline.updated_at = now;

    let all_deposited = timeline.pending_leg_count() == 0;
    if all_deposited {
        timeline.state = TimelineState::EscrowReady;
    }
    let snapshot = timeline.clone();

    emit_cycle_event(
        state,
        keyset,
        cycle_id,
        "settlement.deposit_confirmed",
        confirming_actor,
        serde_json::json!({
            "cycle_id": cycle_id,
            "intent_id": intent_id,
            "deposit_ref": deposit_ref,
            "holding_id": holding.holding_id,
        }),
        now,
    )?;
    if all_deposited {
        emit_state_change(
            state,
            keyset,
            cycle_id,
            TimelineState::EscrowPending,
            TimelineState::EscrowReady,
            confirming_actor,
            now,
        )?;
    }

    Ok((snapshot, false))
}

/// `escrow.ready → executing`
pub fn begin_execution(
    state: &mut AppState,
    keyset: &KeySet,
    cycle_id: &CycleId,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<Timeline> {
    let timeline = timeline_mut(state, cycle_id)?;
    guard_state(timeline, TimelineState::EscrowReady, "begin_execution")?;
    timeline.state = TimelineState::Executing;
    timeline.updated_at = now;
    let snapshot = timeline.clone();

    emit_state_change(
        state,
        keyset,
        cycle_id,
        TimelineState::EscrowReady,
        TimelineState::Executing,
        actor,
        now,
    )?;
    Ok(snapshot)
}

fn leg_releasable(state: &AppState, leg: &swapring_types::TimelineLeg, cycle_id: &CycleId) -> bool {
    if leg.status != LegStatus::Deposited {
        return false;
    }
    let Some(holding_id) = &leg.vault_holding_id else {
        return false;
    };
    state
        .vault_holdings
        .get(holding_id)
        .map(|h| {
            h.status == swapring_types::HoldingStatus::Reserved
                && h.settlement_cycle_id.as_ref() == Some(cycle_id)
        })
        .unwrap_or(false)
}

/// `executing → completed`: every leg releases to its counterparty,
/// intents are consumed, and a signed `completed` receipt lands in the
/// receipts journal.
pub fn complete_settlement(
    state: &mut AppState,
    keyset: &KeySet,
    cycle_id: &CycleId,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<(Timeline, swapring_types::Receipt)> {
    {
        let timeline = timeline_mut(state, cycle_id)?;
        guard_state(timeline, TimelineState::Executing, "complete")?;
    }

    let timeline_snapshot = state.timelines[cycle_id].clone();
    if !timeline_snapshot
        .legs
        .iter()
        .all(|leg| leg_releasable(state, leg, cycle_id))
    {
        return Err(SwapError::invalid_transition(
            TimelineState::Executing.as_str(),
            "complete",
            Some("leg_not_releasable"),
        ));
    }

    // Release every reservation and hand the asset over: the holding
    // leaves the vault as withdrawn.
    for leg in &timeline_snapshot.legs {
        let holding_id = leg.vault_holding_id.clone().expect("releasable leg");
        release_reservation(state, &holding_id, now)?;
        withdraw_holding(state, &holding_id, None, now)?;
    }

    let timeline = timeline_mut(state, cycle_id)?;
    for leg in &mut timeline.legs {
        leg.status = LegStatus::Released;
    }
    timeline.state = TimelineState::Completed;
    timeline.updated_at = now;
    let snapshot = timeline.clone();

    for leg in &snapshot.legs {
        if let Some(intent) = state.intents.get_mut(&leg.intent_id) {
            intent.status = IntentStatus::Consumed;
            intent.updated_at = now;
        }
    }

    emit_state_change(
        state,
        keyset,
        cycle_id,
        TimelineState::Executing,
        TimelineState::Completed,
        actor,
        now,
    )?;
    let receipt = seal_receipt(
        state,
        keyset,
        &snapshot,
        ReceiptFinalState::Completed,
        None,
        actor,
        now,
    )?;
    info!(cycle_id = %cycle_id, receipt_id = %receipt.id, "settlement completed");
    Ok((snapshot, receipt))
}

/// `executing → failed`: reservations release, legs fail, and a signed
/// `failed` receipt lands in the journal.
pub fn fail_settlement(
    state: &mut AppState,
    keyset: &KeySet,
    cycle_id: &CycleId,
    reason_code: &str,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<(Timeline, swapring_types::Receipt)> {
    {
        let timeline = timeline_mut(state, cycle_id)?;
        guard_state(timeline, TimelineState::Executing, "fail")?;
    }

    release_cycle_reservations(state, cycle_id, now)?;

    let timeline = timeline_mut(state, cycle_id)?;
    for leg in &mut timeline.legs {
        leg.status = LegStatus::Failed;
        leg.vault_holding_id = None;
        leg.vault_reservation_id = None;
    }
    timeline.state = TimelineState::Failed;
    timeline.updated_at = now;
    let snapshot = timeline.clone();

    emit_state_change(
        state,
        keyset,
        cycle_id,
        TimelineState::Executing,
        TimelineState::Failed,
        actor,
        now,
    )?;
    let receipt = seal_receipt(
        state,
        keyset,
        &snapshot,
        ReceiptFinalState::Failed,
        Some(reason_code),
        actor,
        now,
    )?;
    info!(cycle_id = %cycle_id, reason_code, "settlement failed");
    Ok((snapshot, receipt))
}

/// `escrow.pending → expired` once the deposit window has elapsed.
/// Every reserved holding is released and a `failed` receipt is sealed
/// with reason `deposit_window_expired`.
pub fn expire_deposit_window(
    state: &mut AppState,
    keyset: &KeySet,
    cycle_id: &CycleId,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<(Timeline, swapring_types::Receipt)> {
    {
        let timeline = timeline_mut(state, cycle_id)?;
        guard_state(timeline, TimelineState::EscrowPending, "expire_deposit_window")?;
        let deadline = timeline.deposit_deadline_at.ok_or_else(|| {
            SwapError::invalid_transition(
                timeline.state.as_str(),
                "expire_deposit_window",
                Some("no_deposit_deadline"),
            )
        })?;
        if now < deadline {
            return Err(SwapError::invalid_transition(
                timeline.state.as_str(),
                "expire_deposit_window",
                Some("deposit_window_open"),
            ));
        }
    }

    release_cycle_reservations(state, cycle_id, now)?;

    let timeline = timeline_mut(state, cycle_id)?;
    timeline.state = TimelineState::Expired;
    timeline.updated_at = now;
    let snapshot = timeline.clone();

    emit_state_change(
        state,
        keyset,
        cycle_id,
        TimelineState::EscrowPending,
        TimelineState::Expired,
        actor,
        now,
    )?;
    let receipt = seal_receipt(
        state,
        keyset,
        &snapshot,
        ReceiptFinalState::Failed,
        Some(REASON_DEPOSIT_WINDOW_EXPIRED),
        actor,
        now,
    )?;
    info!(cycle_id = %cycle_id, "deposit window expired");
    Ok((snapshot, receipt))
}

/// Release every holding still reserved for a cycle
fn release_cycle_reservations(
    state: &mut AppState,
    cycle_id: &CycleId,
    now: DateTime<Utc>,
) -> Result<()> {
    let reserved: Vec<_> = state
        .vault_holdings
        .values()
        .filter(|h| {
            h.settlement_cycle_id.as_ref() == Some(cycle_id)
                && h.status == swapring_types::HoldingStatus::Reserved
        })
        .map(|h| h.holding_id.clone())
        .collect();
    for holding_id in reserved {
        release_reservation(state, &holding_id, now)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use swapring_types::{
        AssetId, CycleProposal, HoldingStatus, ProposalId, ProposalLeg, ProposalStatus, SwapIntent,
        ValueBand,
    };

    fn seed_two_ring(state: &mut AppState) -> (CycleId, IntentId, IntentId) {
        let now = Utc::now();
        let make_intent = |id: &str, user: &str, offer: &str, want: &str| SwapIntent {
            id: IntentId::from_string(id),
            actor: ActorRef::user(user),
            offer: vec![AssetId::from(offer)],
            want: vec![AssetId::from(want)],
            value_band: ValueBand::new(0, 1_000),
            status: swapring_types::IntentStatus::Active,
            partner_id: None,
            created_at: now,
            updated_at: now,
        };
        let ia = make_intent("intent_a", "u1", "a", "b");
        let ib = make_intent("intent_b", "u2", "b", "a");

        let proposal = CycleProposal {
            id: ProposalId::from_string("proposal_1"),
            participants: vec![ia.actor.clone(), ib.actor.clone()],
            legs: vec![
                ProposalLeg {
                    from_actor: ia.actor.clone(),
                    to_actor: ib.actor.clone(),
                    intent_id: ia.id.clone(),
                    asset_id: AssetId::from("a"),
                },
                ProposalLeg {
                    from_actor: ib.actor.clone(),
                    to_actor: ia.actor.clone(),
                    intent_id: ib.id.clone(),
                    asset_id: AssetId::from("b"),
                },
            ],
            score: 100.0,
            status: ProposalStatus::Open,
            expires_at: now + Duration::hours(1),
            partner_id: Some("p1".to_string()),
            created_at: now,
        };

        let ia_id = ia.id.clone();
        let ib_id = ib.id.clone();
        state.intents.insert(ia.id.clone(), ia);
        state.intents.insert(ib.id.clone(), ib);
        state.proposals.insert(proposal.id.clone(), proposal);

        let cycle_id = accept_proposal(
            state,
            &ProposalId::from_string("proposal_1"),
            &ActorRef::partner("p1"),
            now,
        )
        .unwrap()
        .1;
        (cycle_id, ia_id, ib_id)
    }

    fn start(state: &mut AppState, keyset: &KeySet, cycle_id: &CycleId) {
        start_settlement(
            state,
            keyset,
            cycle_id,
            Utc::now() + Duration::hours(1),
            &ActorRef::partner("p1"),
            Utc::now(),
        )
        .unwrap();
    }

    #[test]
    fn test_happy_path_two_ring() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let (cycle_id, ia, ib) = seed_two_ring(&mut state);
        start(&mut state, &keyset, &cycle_id);
        assert_eq!(state.timelines[&cycle_id].state, TimelineState::EscrowPending);

        let now = Utc::now();
        let (_, replayed) = confirm_deposit(
            &mut state, &keyset, &cycle_id, &ia, "dep_a", &ActorRef::user("u1"), false, now,
        )
        .unwrap();
        assert!(!replayed);
        assert_eq!(state.timelines[&cycle_id].state, TimelineState::EscrowPending);

        confirm_deposit(
            &mut state, &keyset, &cycle_id, &ib, "dep_b", &ActorRef::user("u2"), false, now,
        )
        .unwrap();
        assert_eq!(state.timelines[&cycle_id].state, TimelineState::EscrowReady);

        begin_execution(&mut state, &keyset, &cycle_id, &ActorRef::partner("p1"), now).unwrap();
        let (timeline, receipt) =
            complete_settlement(&mut state, &keyset, &cycle_id, &ActorRef::partner("p1"), now)
                .unwrap();

        assert_eq!(timeline.state, TimelineState::Completed);
        assert_eq!(receipt.final_state, ReceiptFinalState::Completed);
        assert!(receipt.signature.is_some());
        assert_eq!(state.receipts.len(), 1);
        assert!(state
            .intents
            .values()
            .all(|i| i.status == swapring_types::IntentStatus::Consumed));
        assert!(state
            .vault_holdings
            .values()
            .all(|h| h.status == HoldingStatus::Withdrawn));
    }

    #[test]
    fn test_deposit_replay_is_noop() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let (cycle_id, ia, _) = seed_two_ring(&mut state);
        start(&mut state, &keyset, &cycle_id);

        let now = Utc::now();
        confirm_deposit(
            &mut state, &keyset, &cycle_id, &ia, "dep_a", &ActorRef::user("u1"), false, now,
        )
        .unwrap();
        let (_, replayed) = confirm_deposit(
            &mut state, &keyset, &cycle_id, &ia, "dep_a", &ActorRef::user("u1"), false, now,
        )
        .unwrap();
        assert!(replayed);
        assert_eq!(state.vault_holdings.len(), 1, "no second holding");

        let err = confirm_deposit(
            &mut state, &keyset, &cycle_id, &ia, "dep_other", &ActorRef::user("u1"), false, now,
        )
        .unwrap_err();
        assert_eq!(err.reason_code(), Some("deposit_ref_mismatch"));
    }

    #[test]
    fn test_wrong_actor_cannot_confirm() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let (cycle_id, ia, _) = seed_two_ring(&mut state);
        start(&mut state, &keyset, &cycle_id);

        let err = confirm_deposit(
            &mut state,
            &keyset,
            &cycle_id,
            &ia,
            "dep_a",
            &ActorRef::user("mallory"),
            false,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        // A delegate holding settlement:deposit may confirm instead.
        confirm_deposit(
            &mut state,
            &keyset,
            &cycle_id,
            &ia,
            "dep_a",
            &ActorRef::service("ops"),
            true,
            Utc::now(),
        )
        .unwrap();
    }

    #[test]
    fn test_expiry_releases_reservations() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let (cycle_id, ia, _) = seed_two_ring(&mut state);

        let now = Utc::now();
        start_settlement(
            &mut state,
            &keyset,
            &cycle_id,
            now + Duration::minutes(10),
            &ActorRef::partner("p1"),
            now,
        )
        .unwrap();
        confirm_deposit(
            &mut state, &keyset, &cycle_id, &ia, "dep_a", &ActorRef::user("u1"), false, now,
        )
        .unwrap();

        // Window still open.
        let err = expire_deposit_window(
            &mut state,
            &keyset,
            &cycle_id,
            &ActorRef::service("sweeper"),
            now,
        )
        .unwrap_err();
        assert_eq!(err.reason_code(), Some("deposit_window_open"));

        let late = now + Duration::minutes(11);
        let (timeline, receipt) = expire_deposit_window(
            &mut state,
            &keyset,
            &cycle_id,
            &ActorRef::service("sweeper"),
            late,
        )
        .unwrap();
        assert_eq!(timeline.state, TimelineState::Expired);
        assert_eq!(receipt.final_state, ReceiptFinalState::Failed);
        assert_eq!(
            receipt.reason_code.as_deref(),
            Some(REASON_DEPOSIT_WINDOW_EXPIRED)
        );
        assert!(state
            .vault_holdings
            .values()
            .all(|h| h.status == HoldingStatus::Released));
    }

    #[test]
    fn test_terminal_state_rejects_everything() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let (cycle_id, ia, ib) = seed_two_ring(&mut state);
        start(&mut state, &keyset, &cycle_id);

        let now = Utc::now();
        for (intent, re, actor) in [(&ia, "dep_a", "u1"), (&ib, "dep_b", "u2")] {
            confirm_deposit(
                &mut state, &keyset, &cycle_id, intent, re, &ActorRef::user(actor), false, now,
            )
            .unwrap();
        }
        begin_execution(&mut state, &keyset, &cycle_id, &ActorRef::partner("p1"), now).unwrap();
        complete_settlement(&mut state, &keyset, &cycle_id, &ActorRef::partner("p1"), now)
            .unwrap();

        let err =
            begin_execution(&mut state, &keyset, &cycle_id, &ActorRef::partner("p1"), now)
                .unwrap_err();
        assert_eq!(err.code(), "invalid_state_transition");
        assert_eq!(err.reason_code(), Some("terminal_state"));

        let err = confirm_deposit(
            &mut state, &keyset, &cycle_id, &ia, "late", &ActorRef::user("u1"), false, now,
        )
        .unwrap_err();
        assert_eq!(err.reason_code(), Some("terminal_state"));
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let (cycle_id, _, _) = seed_two_ring(&mut state);
        start(&mut state, &keyset, &cycle_id);

        // escrow.pending → executing is not a listed transition.
        let err = begin_execution(
            &mut state,
            &keyset,
            &cycle_id,
            &ActorRef::partner("p1"),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_state_transition");
    }

    #[test]
    fn test_fail_clears_leg_holdings() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let (cycle_id, ia, ib) = seed_two_ring(&mut state);
        start(&mut state, &keyset, &cycle_id);

        let now = Utc::now();
        for (intent, re, actor) in [(&ia, "dep_a", "u1"), (&ib, "dep_b", "u2")] {
            confirm_deposit(
                &mut state, &keyset, &cycle_id, intent, re, &ActorRef::user(actor), false, now,
            )
            .unwrap();
        }
        begin_execution(&mut state, &keyset, &cycle_id, &ActorRef::partner("p1"), now).unwrap();
        let (timeline, receipt) = fail_settlement(
            &mut state,
            &keyset,
            &cycle_id,
            "counterparty_defaulted",
            &ActorRef::partner("p1"),
            now,
        )
        .unwrap();

        assert_eq!(timeline.state, TimelineState::Failed);
        assert_eq!(receipt.reason_code.as_deref(), Some("counterparty_defaulted"));
        assert!(timeline.legs.iter().all(|l| l.vault_holding_id.is_none()));
        assert!(state
            .vault_holdings
            .values()
            .all(|h| h.status == HoldingStatus::Released));
    }

    #[test]
    fn test_event_order_state_change_then_receipt() {
        let mut state = AppState::default();
        let keyset = KeySet::generate("key_1");
        let (cycle_id, ia, ib) = seed_two_ring(&mut state);
        start(&mut state, &keyset, &cycle_id);

        let now = Utc::now();
        for (intent, re, actor) in [(&ia, "dep_a", "u1"), (&ib, "dep_b", "u2")] {
            confirm_deposit(
                &mut state, &keyset, &cycle_id, intent, re, &ActorRef::user(actor), false, now,
            )
            .unwrap();
        }
        begin_execution(&mut state, &keyset, &cycle_id, &ActorRef::partner("p1"), now).unwrap();
        complete_settlement(&mut state, &keyset, &cycle_id, &ActorRef::partner("p1"), now)
            .unwrap();

        let types: Vec<&str> = state
            .events
            .iter()
            .filter(|e| e.correlation_id == cycle_id.as_str())
            .map(|e| e.event_type.as_str())
            .collect();
        let last_two = &types[types.len() - 2..];
        assert_eq!(
            last_two,
            ["settlement.state_changed", "settlement.receipt_sealed"]
        );
    }
}
