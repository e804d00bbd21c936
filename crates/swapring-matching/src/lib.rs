//! SwapRing Matching - cycle discovery over the want/offer graph
//!
//! The engine is pure: the same input produces the same ordered set of
//! proposals. Enumeration walks the intent graph (an edge X → Y exists
//! when Y wants an asset X offers), normalizes each ring to its cycle
//! key, scores it, and greedily selects a non-conflicting subset.
//! Safety caps bound cycle length, cycle count, and runtime; hitting
//! the runtime cap is reported, never an error.

pub mod score;
pub mod shadow;

pub use score::*;
pub use shadow::*;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::debug;

use swapring_types::{
    cycle_key_of, ActorRef, AssetId, CycleProposal, IntentId, ProposalId, ProposalLeg,
    ProposalStatus, SwapIntent,
};

/// Safety caps and proposal parameters
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Maximum ring size (k)
    pub max_cycle_len: usize,
    /// Stop after this many selected proposals
    pub max_cycles: usize,
    /// Soft runtime cap; exceeding it sets `timeout_reached`
    pub max_runtime_ms: u64,
    /// Proposal expiry window
    pub proposal_ttl_minutes: i64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_cycle_len: 4,
            max_cycles: 64,
            max_runtime_ms: 250,
            proposal_ttl_minutes: 60,
        }
    }
}

/// Matcher input: active intents plus the asset value table
#[derive(Debug, Clone)]
pub struct MatchInput {
    pub intents: Vec<SwapIntent>,
    pub asset_values: BTreeMap<AssetId, i64>,
    pub now: DateTime<Utc>,
}

/// Matcher output
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Selected proposals, descending score then cycle key
    pub proposals: Vec<CycleProposal>,
    pub timeout_reached: bool,
    /// Rings enumerated before selection
    pub considered_cycles: usize,
}

/// A ring of intent indices found during enumeration
#[derive(Debug, Clone)]
struct FoundCycle {
    intent_indices: Vec<usize>,
    cycle_key: String,
    score: f64,
}

/// Run the matcher over active intents
pub fn find_cycles(input: &MatchInput, config: &MatchConfig) -> MatchOutcome {
    let started = Instant::now();

    // Deterministic intent order: sort by ID.
    let mut intents: Vec<&SwapIntent> = input
        .intents
        .iter()
        .filter(|i| i.status.is_matchable())
        .collect();
    intents.sort_by(|a, b| a.id.cmp(&b.id));

    let offers: Vec<BTreeSet<&AssetId>> = intents.iter().map(|i| i.offer.iter().collect()).collect();
    let wants: Vec<BTreeSet<&AssetId>> = intents.iter().map(|i| i.want.iter().collect()).collect();

    // edge[x] holds every y such that y wants something x offers
    let n = intents.len();
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    for x in 0..n {
        for y in 0..n {
            if x == y {
                continue;
            }
            if intents[x].actor == intents[y].actor {
                continue;
            }
            if offers[x].intersection(&wants[y]).next().is_some() {
                edges[x].push(y);
            }
        }
    }

    let mut found: Vec<FoundCycle> = Vec::new();
    let mut seen_keys: BTreeSet<String> = BTreeSet::new();
    let mut timeout_reached = false;

    // DFS from each anchor; only indices above the anchor may join, so
    // every ring is enumerated exactly once (rotations collapse).
    'anchors: for anchor in 0..n {
        let mut stack: Vec<(Vec<usize>, BTreeSet<usize>)> = Vec::new();
        stack.push((vec![anchor], BTreeSet::from([anchor])));

        while let Some((path, visited)) = stack.pop() {
            if started.elapsed().as_millis() as u64 >= config.max_runtime_ms {
                timeout_reached = true;
                break 'anchors;
            }
            let last = *path.last().expect("path is never empty");
            for &next in &edges[last] {
                if next == anchor && path.len() >= 2 {
                    let participants: Vec<ActorRef> =
                        path.iter().map(|&i| intents[i].actor.clone()).collect();
                    let distinct: BTreeSet<&ActorRef> = participants.iter().collect();
                    if distinct.len() != participants.len() {
                        continue;
                    }
                    let key = cycle_key_of(&participants);
                    if seen_keys.contains(&key) {
                        continue;
                    }
                    seen_keys.insert(key.clone());
                    let score = score_cycle(&path, &intents, &input.asset_values, input.now);
                    found.push(FoundCycle {
                        intent_indices: path.clone(),
                        cycle_key: key,
                        score,
                    });
                } else if next > anchor
                    && !visited.contains(&next)
                    && path.len() < config.max_cycle_len
                {
                    let mut new_path = path.clone();
                    new_path.push(next);
                    let mut new_visited = visited.clone();
                    new_visited.insert(next);
                    stack.push((new_path, new_visited));
                }
            }
        }
    }

    let considered = found.len();

    // Descending score, then lexicographic cycle key.
    found.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cycle_key.cmp(&b.cycle_key))
    });

    // Greedy non-conflicting selection over intent sets.
    let mut used_intents: BTreeSet<&IntentId> = BTreeSet::new();
    let mut proposals = Vec::new();
    for cycle in &found {
        if proposals.len() >= config.max_cycles {
            break;
        }
        if cycle
            .intent_indices
            .iter()
            .any(|&i| used_intents.contains(&intents[i].id))
        {
            continue;
        }
        for &i in &cycle.intent_indices {
            used_intents.insert(&intents[i].id);
        }
        proposals.push(build_proposal(cycle, &intents, input.now, config));
    }

    debug!(
        considered,
        selected = proposals.len(),
        timeout_reached,
        "matching pass finished"
    );

    MatchOutcome {
        proposals,
        timeout_reached,
        considered_cycles: considered,
    }
}

fn build_proposal(
    cycle: &FoundCycle,
    intents: &[&SwapIntent],
    now: DateTime<Utc>,
    config: &MatchConfig,
) -> CycleProposal {
    let k = cycle.intent_indices.len();
    let mut legs = Vec::with_capacity(k);
    for (pos, &i) in cycle.intent_indices.iter().enumerate() {
        let giver = intents[i];
        let receiver = intents[cycle.intent_indices[(pos + 1) % k]];
        // First offered asset the receiver wants, lexicographically.
        let asset = giver
            .offer
            .iter()
            .filter(|a| receiver.want.contains(a))
            .min()
            .cloned()
            .expect("edge implies a shared asset");
        legs.push(ProposalLeg {
            from_actor: giver.actor.clone(),
            to_actor: receiver.actor.clone(),
            intent_id: giver.id.clone(),
            asset_id: asset,
        });
    }

    CycleProposal {
        id: ProposalId::new(),
        participants: cycle
            .intent_indices
            .iter()
            .map(|&i| intents[i].actor.clone())
            .collect(),
        legs,
        score: cycle.score,
        status: ProposalStatus::Open,
        expires_at: now + Duration::minutes(config.proposal_ttl_minutes),
        partner_id: None,
        created_at: now,
    }
}
