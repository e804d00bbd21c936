//! Cycle proposals and acceptance commits
//!
//! A proposal is a closed ring of legs discovered by the matcher (or
//! delivered by a partner webhook). The *cycle key* is the
//! rotation-normalized tuple of participant IDs: the smallest rotation
//! wins, so the same ring always keys identically regardless of which
//! participant the enumeration started from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorRef, AssetId, CommitId, IntentId, ProposalId};

/// One transfer in a proposed cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalLeg {
    pub from_actor: ActorRef,
    pub to_actor: ActorRef,
    pub intent_id: IntentId,
    pub asset_id: AssetId,
}

/// Lifecycle status of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Open,
    Accepted,
    Rejected,
    Expired,
}

/// A discovered cycle proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleProposal {
    pub id: ProposalId,
    /// Participants in ring order
    pub participants: Vec<ActorRef>,
    pub legs: Vec<ProposalLeg>,
    pub score: f64,
    pub status: ProposalStatus,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CycleProposal {
    /// Rotation-normalized participant tuple; the smallest rotation wins
    pub fn cycle_key(&self) -> String {
        cycle_key_of(&self.participants)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Compute the cycle key for an ordered participant ring
pub fn cycle_key_of(participants: &[ActorRef]) -> String {
    if participants.is_empty() {
        return String::new();
    }
    let ids: Vec<String> = participants.iter().map(|p| p.fingerprint()).collect();
    let n = ids.len();
    let mut best: Option<Vec<&String>> = None;
    for start in 0..n {
        let rotation: Vec<&String> = (0..n).map(|i| &ids[(start + i) % n]).collect();
        match &best {
            Some(b) if *b <= rotation => {}
            _ => best = Some(rotation),
        }
    }
    best.unwrap()
        .into_iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("|")
}

/// Acceptance phase of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitPhase {
    Accepted,
    Rejected,
}

/// Record of a partner accepting or rejecting a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub proposal_id: ProposalId,
    pub phase: CommitPhase,
    pub acceptor_actor: ActorRef,
    pub occurred_at: DateTime<Utc>,
}
