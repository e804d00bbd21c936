//! Delegation grants
//!
//! A grant permits one actor to act for another within scope and time
//! bounds. Tokens carrying a grant are issued and introspected by
//! `swapring-auth`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{ActorRef, DelegationId};

/// A stored delegation grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationGrant {
    pub delegation_id: DelegationId,
    pub principal_actor: ActorRef,
    pub delegate_actor: ActorRef,
    /// Scopes the delegate may exercise; sorted for canonical emission
    pub scopes: BTreeSet<String>,
    pub not_before: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl DelegationGrant {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now <= self.expires_at
    }
}

/// Why an introspected token is (in)active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrospectReason {
    Ok,
    Expired,
    Revoked,
    UnknownKeyId,
    BadSignature,
    NotYetValid,
}

/// Result of token introspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrospectResult {
    pub active: bool,
    pub reason: IntrospectReason,
    pub details: serde_json::Value,
}
