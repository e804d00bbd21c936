//! Swap intents
//!
//! An intent is a published wish to rotate assets: what the owner
//! offers and what they want back. Intents are never deleted; they
//! move through `active → matched → consumed` or end `cancelled`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorRef, AssetId, IntentId};

/// Lifecycle status of a swap intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Active,
    Matched,
    Cancelled,
    Consumed,
}

impl IntentStatus {
    /// Whether a proposal leg may still reference this intent
    pub fn is_matchable(&self) -> bool {
        matches!(self, Self::Active | Self::Matched)
    }
}

/// Acceptable value range for the counter-assets, in value-table units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueBand {
    pub min_value: i64,
    pub max_value: i64,
}

impl ValueBand {
    pub fn new(min_value: i64, max_value: i64) -> Self {
        Self {
            min_value,
            max_value,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min_value && value <= self.max_value
    }
}

/// A published swap intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapIntent {
    pub id: IntentId,
    pub actor: ActorRef,
    pub offer: Vec<AssetId>,
    pub want: Vec<AssetId>,
    pub value_band: ValueBand,
    pub status: IntentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_matchable() {
        assert!(IntentStatus::Active.is_matchable());
        assert!(IntentStatus::Matched.is_matchable());
        assert!(!IntentStatus::Cancelled.is_matchable());
        assert!(!IntentStatus::Consumed.is_matchable());
    }

    #[test]
    fn test_value_band_bounds_inclusive() {
        let band = ValueBand::new(10, 20);
        assert!(band.contains(10));
        assert!(band.contains(20));
        assert!(!band.contains(9));
        assert!(!band.contains(21));
    }
}
