//! Settlement timeline types
//!
//! A timeline is the settlement state machine instance for one
//! accepted cycle. Wire names for states use the dotted form
//! (`escrow.pending`) that exports and partners see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ActorRef, AssetId, CycleId, HoldingId, IntentId, ProposalId, ReservationId};

/// Settlement timeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineState {
    #[serde(rename = "initial")]
    Initial,
    #[serde(rename = "escrow.pending")]
    EscrowPending,
    #[serde(rename = "escrow.ready")]
    EscrowReady,
    #[serde(rename = "executing")]
    Executing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "expired")]
    Expired,
}

impl TimelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// Wire name, used in error details and event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::EscrowPending => "escrow.pending",
            Self::EscrowReady => "escrow.ready",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for TimelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-leg settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegStatus {
    Pending,
    Deposited,
    Released,
    Failed,
}

/// One leg of a settlement timeline, mirroring a proposal leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineLeg {
    pub intent_id: IntentId,
    pub from_actor: ActorRef,
    pub to_actor: ActorRef,
    pub asset_id: AssetId,
    pub status: LegStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_holding_id: Option<HoldingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_reservation_id: Option<ReservationId>,
    /// Partner-supplied deposit reference, recorded idempotently
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_ref: Option<String>,
}

/// Settlement state for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub cycle_id: CycleId,
    pub proposal_id: ProposalId,
    pub state: TimelineState,
    pub legs: Vec<TimelineLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_deadline_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timeline {
    pub fn leg_for_intent(&self, intent_id: &IntentId) -> Option<&TimelineLeg> {
        self.legs.iter().find(|l| &l.intent_id == intent_id)
    }

    pub fn pending_leg_count(&self) -> usize {
        self.legs
            .iter()
            .filter(|l| l.status == LegStatus::Pending)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TimelineState::Completed.is_terminal());
        assert!(TimelineState::Failed.is_terminal());
        assert!(TimelineState::Expired.is_terminal());
        assert!(!TimelineState::Executing.is_terminal());
    }

    #[test]
    fn test_wire_names_use_dotted_form() {
        let json = serde_json::to_string(&TimelineState::EscrowPending).unwrap();
        assert_eq!(json, "\"escrow.pending\"");
        let back: TimelineState = serde_json::from_str("\"escrow.ready\"").unwrap();
        assert_eq!(back, TimelineState::EscrowReady);
    }
}
