//! Shadow execution for matcher parity burn-in
//!
//! A secondary matcher variant runs alongside the primary; both
//! outputs are recorded with structural diffs over cycle-key sets.
//! Shadow failures are captured, never propagated - the primary result
//! is untouchable. A bounded ring buffer retains the most recent
//! records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use tracing::warn;

use crate::{MatchConfig, MatchInput, MatchOutcome};
use swapring_types::SwapError;

/// Structural diff between primary and secondary cycle-key sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowDiff {
    pub overlap: BTreeSet<String>,
    pub only_primary: BTreeSet<String>,
    pub only_secondary: BTreeSet<String>,
}

impl ShadowDiff {
    pub fn is_parity(&self) -> bool {
        self.only_primary.is_empty() && self.only_secondary.is_empty()
    }
}

/// A captured shadow failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowError {
    pub code: String,
    pub name: String,
    pub message: String,
}

/// One shadow run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowRecord {
    pub ran_at: DateTime<Utc>,
    pub primary_cycles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<ShadowDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ShadowError>,
}

/// Bounded retention of shadow records
pub struct ShadowRunner {
    records: VecDeque<ShadowRecord>,
    capacity: usize,
}

impl ShadowRunner {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Run the secondary variant against the primary outcome and
    /// record the structural diff. The primary outcome passes through
    /// untouched.
    pub fn observe<F>(
        &mut self,
        input: &MatchInput,
        config: &MatchConfig,
        primary: &MatchOutcome,
        secondary: F,
    ) -> &ShadowRecord
    where
        F: FnOnce(&MatchInput, &MatchConfig) -> Result<MatchOutcome, SwapError>,
    {
        let record = match secondary(input, config) {
            Ok(shadow_outcome) => {
                let primary_keys: BTreeSet<String> =
                    primary.proposals.iter().map(|p| p.cycle_key()).collect();
                let secondary_keys: BTreeSet<String> = shadow_outcome
                    .proposals
                    .iter()
                    .map(|p| p.cycle_key())
                    .collect();
                let diff = ShadowDiff {
                    overlap: primary_keys.intersection(&secondary_keys).cloned().collect(),
                    only_primary: primary_keys.difference(&secondary_keys).cloned().collect(),
                    only_secondary: secondary_keys.difference(&primary_keys).cloned().collect(),
                };
                if !diff.is_parity() {
                    warn!(
                        only_primary = diff.only_primary.len(),
                        only_secondary = diff.only_secondary.len(),
                        "matcher shadow divergence"
                    );
                }
                ShadowRecord {
                    ran_at: Utc::now(),
                    primary_cycles: primary.proposals.len(),
                    diff: Some(diff),
                    error: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "matcher shadow failed");
                ShadowRecord {
                    ran_at: Utc::now(),
                    primary_cycles: primary.proposals.len(),
                    diff: None,
                    error: Some(ShadowError {
                        code: err.code().to_string(),
                        name: "SwapError".to_string(),
                        message: err.to_string(),
                    }),
                }
            }
        };

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.records.back().expect("just pushed")
    }

    pub fn records(&self) -> impl Iterator<Item = &ShadowRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
