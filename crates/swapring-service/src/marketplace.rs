//! Matching and proposal operations

use serde_json::{json, Value};
use std::collections::BTreeMap;

use swapring_auth::require_tenancy;
use swapring_matching::{find_cycles, MatchConfig, MatchInput};
use swapring_outbox::{append_event, deterministic_event_id};
use swapring_settlement::{accept_proposal, reject_proposal};
use swapring_store::AppState;
use swapring_types::{AssetId, ProposalId, Result, SwapError};

use crate::{body_str, OperationRequest, ResponseEnvelope, SwapService};

fn parse_match_config(body: &Value) -> MatchConfig {
    let mut config = MatchConfig::default();
    if let Some(v) = body.get("max_cycle_len").and_then(|v| v.as_u64()) {
        config.max_cycle_len = v as usize;
    }
    if let Some(v) = body.get("max_cycles").and_then(|v| v.as_u64()) {
        config.max_cycles = v as usize;
    }
    if let Some(v) = body.get("max_runtime_ms").and_then(|v| v.as_u64()) {
        config.max_runtime_ms = v;
    }
    config
}

fn parse_asset_values(body: &Value) -> Result<BTreeMap<AssetId, i64>> {
    let Some(values) = body.get("asset_values") else {
        return Ok(BTreeMap::new());
    };
    let map = values
        .as_object()
        .ok_or_else(|| SwapError::validation("asset_values must be an object"))?;
    let mut out = BTreeMap::new();
    for (asset, value) in map {
        let value = value
            .as_i64()
            .ok_or_else(|| SwapError::validation("asset values must be integers"))?;
        out.insert(AssetId::from_string(asset.clone()), value);
    }
    Ok(out)
}

fn proposal_partner(state: &AppState, proposal_id: &ProposalId) -> Option<String> {
    state
        .tenancy
        .proposals
        .get(proposal_id)
        .cloned()
        .or_else(|| {
            state
                .proposals
                .get(proposal_id)
                .and_then(|p| p.partner_id.clone())
        })
}

impl SwapService {
    /// `matching.run`: enumerate, score, and persist cycle proposals.
    /// With `shadow: true` a secondary pass runs for parity burn-in;
    /// its outcome never affects the primary result.
    pub async fn matching_run(&self, request: OperationRequest) -> ResponseEnvelope {
        let shadow_requested = request
            .body
            .get("shadow")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let response = self
            .execute(
                "matching.run",
                request,
                &["matching:run"],
                |state, body, context, keyset, _config| {
                    let config = parse_match_config(body);
                    let input = MatchInput {
                        intents: state.intents.values().cloned().collect(),
                        asset_values: parse_asset_values(body)?,
                        now: context.now,
                    };
                    let outcome = find_cycles(&input, &config);

                    for proposal in &outcome.proposals {
                        state
                            .proposals
                            .insert(proposal.id.clone(), proposal.clone());
                        append_event(
                            state,
                            keyset,
                            deterministic_event_id(
                                "cycleProposals.discovered",
                                proposal.id.as_str(),
                                0,
                            ),
                            "cycleProposals.discovered",
                            proposal.id.as_str(),
                            context.actor.clone(),
                            json!({
                                "proposal_id": proposal.id,
                                "cycle_key": proposal.cycle_key(),
                                "score": proposal.score,
                            }),
                            context.now,
                        )?;
                    }

                    Ok(json!({
                        "proposals": outcome.proposals,
                        "timeout_reached": outcome.timeout_reached,
                        "considered_cycles": outcome.considered_cycles,
                    }))
                },
            )
            .await;

        if response.ok && shadow_requested {
            self.run_matching_shadow(&response.body).await;
        }
        response
    }

    /// Secondary pass over the same persisted inputs; diffs land in
    /// the bounded shadow ring.
    async fn run_matching_shadow(&self, primary_body: &Value) {
        let state = self.store.read().await;
        let input = MatchInput {
            intents: state.intents.values().cloned().collect(),
            asset_values: BTreeMap::new(),
            now: chrono::Utc::now(),
        };
        drop(state);

        let config = MatchConfig::default();
        let primary_keys: Vec<String> = primary_body["proposals"]
            .as_array()
            .map(|ps| {
                ps.iter()
                    .filter_map(|p| serde_json::from_value(p.clone()).ok())
                    .map(|p: swapring_types::CycleProposal| p.cycle_key())
                    .collect()
            })
            .unwrap_or_default();
        let primary = swapring_matching::MatchOutcome {
            proposals: primary_body["proposals"]
                .as_array()
                .map(|ps| {
                    ps.iter()
                        .filter_map(|p| serde_json::from_value(p.clone()).ok())
                        .collect()
                })
                .unwrap_or_default(),
            timeout_reached: false,
            considered_cycles: primary_keys.len(),
        };

        let mut runner = self.shadow_runner().await;
        runner.observe(&input, &config, &primary, |i, c| Ok(find_cycles(i, c)));
    }

    /// `matching.shadow_records`
    pub async fn matching_shadow_records(&self, request: OperationRequest) -> ResponseEnvelope {
        let runner = self.shadow_runner().await;
        let records: Vec<_> = runner.records().collect();
        let body = json!({ "records": records, "total": records.len() });
        drop(runner);
        self.execute_read(
            "matching.shadow_records",
            request,
            &["matching:run"],
            move |_state, _body, _context, _keyset, _config| Ok(body),
        )
        .await
    }

    /// `cycleProposals.accept`
    pub async fn proposals_accept(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "cycleProposals.accept",
            request,
            &["cycles:accept"],
            |state, body, context, keyset, config| {
                let proposal_id = ProposalId::from_string(body_str(body, "proposal_id")?);
                require_tenancy(
                    config,
                    context,
                    proposal_partner(state, &proposal_id).as_deref(),
                    "proposal",
                )?;

                let (commit, cycle_id) =
                    accept_proposal(state, &proposal_id, &context.actor, context.now)?;

                append_event(
                    state,
                    keyset,
                    deterministic_event_id("cycleProposals.accepted", proposal_id.as_str(), 0),
                    "cycleProposals.accepted",
                    proposal_id.as_str(),
                    context.actor.clone(),
                    json!({"proposal_id": proposal_id, "cycle_id": cycle_id}),
                    context.now,
                )?;

                Ok(json!({ "commit": commit, "cycle_id": cycle_id }))
            },
        )
        .await
    }

    /// `cycleProposals.reject`
    pub async fn proposals_reject(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute(
            "cycleProposals.reject",
            request,
            &["cycles:accept"],
            |state, body, context, keyset, config| {
                let proposal_id = ProposalId::from_string(body_str(body, "proposal_id")?);
                require_tenancy(
                    config,
                    context,
                    proposal_partner(state, &proposal_id).as_deref(),
                    "proposal",
                )?;

                let commit = reject_proposal(state, &proposal_id, &context.actor, context.now)?;

                append_event(
                    state,
                    keyset,
                    deterministic_event_id("cycleProposals.rejected", proposal_id.as_str(), 0),
                    "cycleProposals.rejected",
                    proposal_id.as_str(),
                    context.actor.clone(),
                    json!({"proposal_id": proposal_id}),
                    context.now,
                )?;

                Ok(json!({ "commit": commit }))
            },
        )
        .await
    }

    /// `cycleProposals.list`
    pub async fn proposals_list(&self, request: OperationRequest) -> ResponseEnvelope {
        self.execute_read(
            "cycleProposals.list",
            request,
            &["cycles:read"],
            |state, body, context, _keyset, _config| {
                let status = body.get("status").and_then(|v| v.as_str());
                let proposals: Vec<_> = state
                    .proposals
                    .values()
                    .filter(|p| {
                        context.is_privileged()
                            || proposal_partner(state, &p.id)
                                .map(|owner| context.may_access_partner(&owner))
                                .unwrap_or(true)
                    })
                    .filter(|p| match status {
                        Some(s) => {
                            serde_json::to_value(p.status)
                                .map(|v| v.as_str() == Some(s))
                                .unwrap_or(false)
                        }
                        None => true,
                    })
                    .collect();
                Ok(json!({
                    "proposals": proposals,
                    "total": proposals.len(),
                }))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapring_types::ActorRef;

    async fn seed_intents(service: &SwapService) {
        for (user, offer, want) in [("u1", "a", "b"), ("u2", "b", "a")] {
            let response = service
                .intents_create(
                    OperationRequest::new(&ActorRef::user(user))
                        .with_scopes(&["intents:write"])
                        .with_body(json!({"offer": [offer], "want": [want]})),
                )
                .await;
            assert!(response.ok);
        }
    }

    fn match_body() -> Value {
        json!({"asset_values": {"a": 100, "b": 100}})
    }

    #[tokio::test]
    async fn test_matching_persists_proposals() {
        let service = SwapService::in_memory();
        seed_intents(&service).await;

        let response = service
            .matching_run(
                OperationRequest::new(&ActorRef::service("matcher"))
                    .with_scopes(&["matching:run"])
                    .with_body(match_body()),
            )
            .await;
        assert!(response.ok, "{:?}", response.body);
        assert_eq!(response.body["proposals"].as_array().unwrap().len(), 1);
        assert_eq!(response.body["timeout_reached"], false);
    }

    #[tokio::test]
    async fn test_accept_then_double_accept() {
        let service = SwapService::in_memory();
        seed_intents(&service).await;
        let matched = service
            .matching_run(
                OperationRequest::new(&ActorRef::service("matcher"))
                    .with_scopes(&["matching:run"])
                    .with_body(match_body()),
            )
            .await;
        let proposal_id = matched.body["proposals"][0]["id"].as_str().unwrap().to_string();

        let accept = service
            .proposals_accept(
                OperationRequest::new(&ActorRef::partner("p1"))
                    .with_scopes(&["cycles:accept"])
                    .with_body(json!({"proposal_id": proposal_id})),
            )
            .await;
        assert!(accept.ok, "{:?}", accept.body);
        assert!(accept.body["cycle_id"].as_str().unwrap().starts_with("cycle_"));

        let again = service
            .proposals_accept(
                OperationRequest::new(&ActorRef::partner("p1"))
                    .with_scopes(&["cycles:accept"])
                    .with_body(json!({"proposal_id": matched.body["proposals"][0]["id"]})),
            )
            .await;
        assert_eq!(again.error_code(), Some("conflict"));
    }

    #[tokio::test]
    async fn test_shadow_records_accumulate() {
        let service = SwapService::in_memory();
        seed_intents(&service).await;
        let mut body = match_body();
        body["shadow"] = json!(true);
        service
            .matching_run(
                OperationRequest::new(&ActorRef::service("matcher"))
                    .with_scopes(&["matching:run"])
                    .with_body(body),
            )
            .await;

        let records = service
            .matching_shadow_records(
                OperationRequest::new(&ActorRef::service("matcher"))
                    .with_scopes(&["matching:run"]),
            )
            .await;
        assert!(records.ok);
        assert_eq!(records.body["total"], 1);
    }
}
