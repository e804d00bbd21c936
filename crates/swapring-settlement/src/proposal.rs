//! Proposal acceptance
//!
//! Accepting an open proposal consumes it: participants' intents move
//! to `matched`, a commit records the acceptance, and the settlement
//! cycle ID is fixed (derived from the proposal so retries land on the
//! same cycle).

use chrono::{DateTime, Utc};
use tracing::info;

use swapring_store::AppState;
use swapring_types::{
    ActorRef, ActorType, Commit, CommitId, CommitPhase, CycleId, IntentStatus, ProposalId,
    ProposalStatus, Result, SwapError,
};

/// The settlement cycle ID an accepted proposal settles under
pub fn cycle_id_for_proposal(proposal_id: &ProposalId) -> CycleId {
    CycleId::from_string(format!("cycle_{}", proposal_id))
}

/// Reverse lookup: which proposal does a cycle settle?
pub fn proposal_for_cycle(state: &AppState, cycle_id: &CycleId) -> Result<ProposalId> {
    if let Some(timeline) = state.timelines.get(cycle_id) {
        return Ok(timeline.proposal_id.clone());
    }
    let raw = cycle_id
        .as_str()
        .strip_prefix("cycle_")
        .ok_or_else(|| SwapError::not_found("cycle", cycle_id.as_str()))?;
    let proposal_id = ProposalId::from_string(raw);
    if state.proposals.contains_key(&proposal_id) {
        Ok(proposal_id)
    } else {
        Err(SwapError::not_found("cycle", cycle_id.as_str()))
    }
}

/// Accept an open, unexpired proposal
pub fn accept_proposal(
    state: &mut AppState,
    proposal_id: &ProposalId,
    acceptor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<(Commit, CycleId)> {
    let proposal = state
        .proposals
        .get(proposal_id)
        .ok_or_else(|| SwapError::not_found("proposal", proposal_id.as_str()))?
        .clone();

    match proposal.status {
        ProposalStatus::Open => {}
        ProposalStatus::Expired => {
            return Err(SwapError::conflict_with_reason(
                format!("proposal {} has expired", proposal_id),
                "proposal_expired",
            ));
        }
        _ => {
            return Err(SwapError::conflict_with_reason(
                format!("proposal {} was already decided", proposal_id),
                "proposal_decided",
            ));
        }
    }
    if proposal.is_expired(now) {
        return Err(SwapError::conflict_with_reason(
            format!("proposal {} has expired", proposal_id),
            "proposal_expired",
        ));
    }

    // Every leg must still point at a matchable intent owned by the
    // leg's from_actor.
    for leg in &proposal.legs {
        let intent = state
            .intents
            .get(&leg.intent_id)
            .ok_or_else(|| SwapError::not_found("intent", leg.intent_id.as_str()))?;
        if !intent.status.is_matchable() {
            return Err(SwapError::conflict_with_reason(
                format!("intent {} is no longer matchable", leg.intent_id),
                "intent_unavailable",
            ));
        }
        if intent.actor != leg.from_actor {
            return Err(SwapError::validation(format!(
                "leg actor mismatch for intent {}",
                leg.intent_id
            )));
        }
    }

    for leg in &proposal.legs {
        if let Some(intent) = state.intents.get_mut(&leg.intent_id) {
            intent.status = IntentStatus::Matched;
            intent.updated_at = now;
        }
    }

    let stored = state
        .proposals
        .get_mut(proposal_id)
        .expect("proposal presence checked");
    stored.status = ProposalStatus::Accepted;

    let commit = Commit {
        id: CommitId::new(),
        proposal_id: proposal_id.clone(),
        phase: CommitPhase::Accepted,
        acceptor_actor: acceptor.clone(),
        occurred_at: now,
    };
    state.commits.insert(commit.id.clone(), commit.clone());

    let cycle_id = cycle_id_for_proposal(proposal_id);
    let owning_partner = proposal.partner_id.clone().or_else(|| {
        (acceptor.actor_type == ActorType::Partner).then(|| acceptor.id.clone())
    });
    if let Some(partner) = owning_partner {
        state
            .tenancy
            .proposals
            .insert(proposal_id.clone(), partner.clone());
        state.tenancy.cycles.insert(cycle_id.clone(), partner);
    }

    info!(proposal_id = %proposal_id, cycle_id = %cycle_id, "proposal accepted");
    Ok((commit, cycle_id))
}

/// Reject an open proposal
pub fn reject_proposal(
    state: &mut AppState,
    proposal_id: &ProposalId,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<Commit> {
    let proposal = state
        .proposals
        .get_mut(proposal_id)
        .ok_or_else(|| SwapError::not_found("proposal", proposal_id.as_str()))?;
    if proposal.status != ProposalStatus::Open {
        return Err(SwapError::conflict_with_reason(
            format!("proposal {} was already decided", proposal_id),
            "proposal_decided",
        ));
    }
    proposal.status = ProposalStatus::Rejected;

    let commit = Commit {
        id: CommitId::new(),
        proposal_id: proposal_id.clone(),
        phase: CommitPhase::Rejected,
        acceptor_actor: actor.clone(),
        occurred_at: now,
    };
    state.commits.insert(commit.id.clone(), commit.clone());
    info!(proposal_id = %proposal_id, "proposal rejected");
    Ok(commit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use swapring_types::{
        AssetId, CycleProposal, IntentId, ProposalLeg, SwapIntent, ValueBand,
    };

    fn seed(state: &mut AppState, expires_in_minutes: i64) -> ProposalId {
        let now = Utc::now();
        let intent = |id: &str, user: &str, offer: &str, want: &str| SwapIntent {
            id: IntentId::from_string(id),
            actor: ActorRef::user(user),
            offer: vec![AssetId::from(offer)],
            want: vec![AssetId::from(want)],
            value_band: ValueBand::new(0, 1_000),
            status: IntentStatus::Active,
            partner_id: None,
            created_at: now,
            updated_at: now,
        };
        let ia = intent("intent_a", "u1", "a", "b");
        let ib = intent("intent_b", "u2", "b", "a");
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
            expires_at: now + Duration::minutes(expires_in_minutes),
            partner_id: None,
            created_at: now,
        };
        let id = proposal.id.clone();
        state.intents.insert(ia.id.clone(), ia);
        state.intents.insert(ib.id.clone(), ib);
        state.proposals.insert(id.clone(), proposal);
        id
    }

    #[test]
    fn test_accept_moves_intents_to_matched() {
        let mut state = AppState::default();
        let proposal_id = seed(&mut state, 60);
        let (commit, cycle_id) =
            accept_proposal(&mut state, &proposal_id, &ActorRef::partner("p1"), Utc::now())
                .unwrap();

        assert_eq!(commit.phase, CommitPhase::Accepted);
        assert_eq!(cycle_id.as_str(), "cycle_proposal_1");
        assert!(state
            .intents
            .values()
            .all(|i| i.status == IntentStatus::Matched));
        assert_eq!(
            state.tenancy.cycles.get(&cycle_id),
            Some(&"p1".to_string())
        );
    }

    #[test]
    fn test_double_accept_conflicts() {
        let mut state = AppState::default();
        let proposal_id = seed(&mut state, 60);
        accept_proposal(&mut state, &proposal_id, &ActorRef::partner("p1"), Utc::now()).unwrap();
        let err =
            accept_proposal(&mut state, &proposal_id, &ActorRef::partner("p1"), Utc::now())
                .unwrap_err();
        assert_eq!(err.reason_code(), Some("proposal_decided"));
    }

    #[test]
    fn test_expired_proposal_rejected() {
        let mut state = AppState::default();
        let proposal_id = seed(&mut state, 60);
        let late = Utc::now() + Duration::hours(2);
        let err = accept_proposal(&mut state, &proposal_id, &ActorRef::partner("p1"), late)
            .unwrap_err();
        assert_eq!(err.reason_code(), Some("proposal_expired"));
    }

    #[test]
    fn test_cancelled_intent_blocks_acceptance() {
        let mut state = AppState::default();
        let proposal_id = seed(&mut state, 60);
        state
            .intents
            .get_mut(&IntentId::from_string("intent_a"))
            .unwrap()
            .status = IntentStatus::Cancelled;
        let err =
            accept_proposal(&mut state, &proposal_id, &ActorRef::partner("p1"), Utc::now())
                .unwrap_err();
        assert_eq!(err.reason_code(), Some("intent_unavailable"));
    }

    #[test]
    fn test_reject_records_commit() {
        let mut state = AppState::default();
        let proposal_id = seed(&mut state, 60);
        let commit =
            reject_proposal(&mut state, &proposal_id, &ActorRef::partner("p1"), Utc::now())
                .unwrap();
        assert_eq!(commit.phase, CommitPhase::Rejected);
        assert_eq!(
            state.proposals[&proposal_id].status,
            ProposalStatus::Rejected
        );
    }
}
