//! Cycle scoring
//!
//! A ring's score is a scalar blend of three signals:
//!
//! - value balance: how evenly the legs' asset values line up
//!   (a balanced ring leaves nobody short-changed)
//! - freshness: newer intents score higher
//! - diversity: larger rings rebalance more participants
//!
//! `score = 100 * balance + 10 * freshness + 5 * diversity`
//!
//! The weights are fixed; primary and shadow variants must stay in
//! parity on them.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use swapring_types::{AssetId, SwapIntent};

const BALANCE_WEIGHT: f64 = 100.0;
const FRESHNESS_WEIGHT: f64 = 10.0;
const DIVERSITY_WEIGHT: f64 = 5.0;

/// Largest ring the diversity signal saturates at
const DIVERSITY_CEILING: f64 = 6.0;

/// Score a ring given the indices of its intents
pub fn score_cycle(
    intent_indices: &[usize],
    intents: &[&SwapIntent],
    asset_values: &BTreeMap<AssetId, i64>,
    now: DateTime<Utc>,
) -> f64 {
    let leg_values: Vec<i64> = intent_indices
        .iter()
        .map(|&i| {
            intents[i]
                .offer
                .iter()
                .filter_map(|a| asset_values.get(a))
                .max()
                .copied()
                .unwrap_or(0)
        })
        .collect();

    let balance = value_balance(&leg_values);
    let freshness = intent_indices
        .iter()
        .map(|&i| freshness_of(intents[i], now))
        .sum::<f64>()
        / intent_indices.len() as f64;
    let diversity = (intent_indices.len() as f64 / DIVERSITY_CEILING).min(1.0);

    BALANCE_WEIGHT * balance + FRESHNESS_WEIGHT * freshness + DIVERSITY_WEIGHT * diversity
}

/// 1.0 when every leg carries the same value, falling toward 0.0 as
/// the spread widens
fn value_balance(leg_values: &[i64]) -> f64 {
    let max = leg_values.iter().copied().max().unwrap_or(0);
    let min = leg_values.iter().copied().min().unwrap_or(0);
    if max <= 0 {
        return 0.0;
    }
    1.0 - (max - min) as f64 / max as f64
}

/// Decays with intent age; an hour-old intent scores 0.5
fn freshness_of(intent: &SwapIntent, now: DateTime<Utc>) -> f64 {
    let age_minutes = (now - intent.created_at).num_minutes().max(0) as f64;
    1.0 / (1.0 + age_minutes / 60.0)
}
