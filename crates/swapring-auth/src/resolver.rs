//! Auth resolution
//!
//! Turns transport-supplied actor/auth material into an [`AuthContext`]:
//! parse the actor, verify any delegation token, then let operations
//! enforce scopes and tenancy against the context.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use swapring_crypto::{verify_object, KeySet, VerifyOutcome};
use swapring_types::{
    ActorRef, ActorType, DelegationGrant, DelegationId, Result, SwapError,
};

use crate::{decode_token, PolicyConfig};

/// Raw auth material from the transport
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// Actor as "type:id"
    pub actor: Option<String>,
    /// Transport-asserted scopes (session claims)
    pub scopes: Vec<String>,
    /// Optional bearer delegation token
    pub delegation_token: Option<String>,
}

impl AuthRequest {
    pub fn for_actor(actor: &ActorRef) -> Self {
        Self {
            actor: Some(actor.fingerprint()),
            scopes: Vec::new(),
            delegation_token: None,
        }
    }

    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = scopes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.delegation_token = Some(token.into());
        self
    }
}

/// Resolved authorization context
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: ActorRef,
    pub scopes: BTreeSet<String>,
    pub delegation: Option<DelegationGrant>,
    pub partner_tenant: Option<String>,
    pub now: DateTime<Utc>,
}

impl AuthContext {
    /// Admin and service actors bypass tenancy walls
    pub fn is_privileged(&self) -> bool {
        matches!(self.actor.actor_type, ActorType::Admin | ActorType::Service)
            || self.scopes.contains("admin")
    }

    /// Whether this context may touch a resource owned by `partner_id`
    pub fn may_access_partner(&self, partner_id: &str) -> bool {
        if self.is_privileged() {
            return true;
        }
        if self.partner_tenant.as_deref() == Some(partner_id) {
            return true;
        }
        // A delegation whose principal is the owning partner covers it.
        if let Some(grant) = &self.delegation {
            if grant.principal_actor.actor_type == ActorType::Partner
                && grant.principal_actor.id == partner_id
            {
                return true;
            }
        }
        false
    }
}

/// Resolve an [`AuthRequest`] into a context.
///
/// `stored_grant` looks up the persisted grant so revocations issued
/// after the token was minted are honored.
pub fn resolve(
    request: &AuthRequest,
    keyset: &KeySet,
    stored_grant: impl Fn(&DelegationId) -> Option<DelegationGrant>,
    now: DateTime<Utc>,
) -> Result<AuthContext> {
    let raw_actor = request.actor.as_deref().ok_or_else(|| {
        SwapError::Unauthenticated {
            reason: "missing actor".into(),
        }
    })?;
    let actor = ActorRef::parse(raw_actor).ok_or_else(|| SwapError::Unauthenticated {
        reason: format!("malformed actor '{}'", raw_actor),
    })?;

    let request_scopes: BTreeSet<String> = request.scopes.iter().cloned().collect();

    let mut context = AuthContext {
        partner_tenant: match actor.actor_type {
            ActorType::Partner => Some(actor.id.clone()),
            _ => None,
        },
        actor,
        scopes: request_scopes.clone(),
        delegation: None,
        now,
    };

    if let Some(token) = &request.delegation_token {
        let grant = verify_delegation(token, keyset, &stored_grant, now)?;
        if grant.delegate_actor != context.actor {
            return Err(SwapError::InvalidDelegation {
                reason: "token delegate does not match request actor".into(),
            });
        }
        // Scope intersection over the grant; a bare request inherits
        // the grant's scopes outright.
        context.scopes = if request_scopes.is_empty() {
            grant.scopes.clone()
        } else {
            request_scopes
                .intersection(&grant.scopes)
                .cloned()
                .collect()
        };
        if context.actor.actor_type != ActorType::Partner {
            if grant.principal_actor.actor_type == ActorType::Partner {
                context.partner_tenant = Some(grant.principal_actor.id.clone());
            }
        }
        context.delegation = Some(grant);
    }

    Ok(context)
}

fn verify_delegation(
    token: &str,
    keyset: &KeySet,
    stored_grant: impl Fn(&DelegationId) -> Option<DelegationGrant>,
    now: DateTime<Utc>,
) -> Result<DelegationGrant> {
    let value = decode_token(token).ok_or_else(|| SwapError::InvalidDelegation {
        reason: "token is not a valid envelope".into(),
    })?;

    match verify_object(keyset, &value) {
        VerifyOutcome::Ok => {}
        outcome => {
            return Err(SwapError::InvalidDelegation {
                reason: outcome.error_code().unwrap_or("unknown").to_string(),
            });
        }
    }

    let grant: DelegationGrant = {
        let mut unsigned = value;
        if let Some(map) = unsigned.as_object_mut() {
            map.remove("signature");
        }
        serde_json::from_value(unsigned).map_err(|_| SwapError::InvalidDelegation {
            reason: "grant payload malformed".into(),
        })?
    };

    let current = stored_grant(&grant.delegation_id).unwrap_or_else(|| grant.clone());
    if current.is_revoked() || grant.is_revoked() {
        return Err(SwapError::DelegationRevoked {
            delegation_id: grant.delegation_id.to_string(),
        });
    }
    if now > grant.expires_at {
        return Err(SwapError::DelegationExpired {
            delegation_id: grant.delegation_id.to_string(),
        });
    }
    if now < grant.not_before {
        return Err(SwapError::InvalidDelegation {
            reason: "token not yet valid".into(),
        });
    }
    if grant.scopes.is_empty() {
        return Err(SwapError::InvalidDelegation {
            reason: "grant carries no scopes".into(),
        });
    }
    Ok(grant)
}

/// Enforce the scopes an operation declares
pub fn require_scopes(
    config: &PolicyConfig,
    context: &AuthContext,
    required: &[&str],
) -> Result<()> {
    if !config.authz_enforce || context.is_privileged() {
        return Ok(());
    }
    for scope in required {
        if !context.scopes.contains(*scope) {
            return Err(SwapError::InsufficientScope {
                required: scope.to_string(),
            });
        }
    }
    Ok(())
}

/// Enforce tenancy for a resource tagged with a partner
pub fn require_tenancy(
    config: &PolicyConfig,
    context: &AuthContext,
    resource_partner: Option<&str>,
    resource: &str,
) -> Result<()> {
    if !config.authz_enforce {
        return Ok(());
    }
    if let Some(partner_id) = resource_partner {
        if !context.may_access_partner(partner_id) {
            return Err(SwapError::TenancyForbidden {
                resource: resource.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_token;
    use chrono::Duration;

    fn keyset() -> KeySet {
        KeySet::generate("key_1")
    }

    fn grant(keyset: &KeySet, scopes: &[&str]) -> (DelegationGrant, String) {
        let now = Utc::now();
        let grant = DelegationGrant {
            delegation_id: DelegationId::new(),
            principal_actor: ActorRef::partner("p1"),
            delegate_actor: ActorRef::service("ops"),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            not_before: now - Duration::minutes(1),
            expires_at: now + Duration::hours(1),
            revoked_at: None,
        };
        let token = encode_token(keyset, &PolicyConfig::default(), &grant).unwrap();
        (grant, token)
    }

    #[test]
    fn test_resolve_plain_actor() {
        let keyset = keyset();
        let request = AuthRequest::for_actor(&ActorRef::partner("p1")).with_scopes(&["read:cycles"]);
        let context = resolve(&request, &keyset, |_| None, Utc::now()).unwrap();
        assert_eq!(context.partner_tenant.as_deref(), Some("p1"));
        assert!(context.scopes.contains("read:cycles"));
    }

    #[test]
    fn test_resolve_rejects_malformed_actor() {
        let keyset = keyset();
        let request = AuthRequest {
            actor: Some("robot#1".into()),
            ..Default::default()
        };
        let err = resolve(&request, &keyset, |_| None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_delegated_context_takes_grant_scopes() {
        let keyset = keyset();
        let (grant, token) = grant(&keyset, &["read:cycles", "settlement:deposit"]);
        let request = AuthRequest::for_actor(&grant.delegate_actor).with_token(token);
        let context = resolve(&request, &keyset, |_| Some(grant.clone()), Utc::now()).unwrap();
        assert_eq!(context.scopes.len(), 2);
        assert_eq!(context.partner_tenant.as_deref(), Some("p1"));
        assert!(context.delegation.is_some());
    }

    #[test]
    fn test_scope_intersection_with_request_scopes() {
        let keyset = keyset();
        let (grant, token) = grant(&keyset, &["read:cycles", "settlement:deposit"]);
        let request = AuthRequest::for_actor(&grant.delegate_actor)
            .with_scopes(&["read:cycles", "vault:withdraw"])
            .with_token(token);
        let context = resolve(&request, &keyset, |_| Some(grant.clone()), Utc::now()).unwrap();
        assert!(context.scopes.contains("read:cycles"));
        assert!(!context.scopes.contains("vault:withdraw"));
        assert!(!context.scopes.contains("settlement:deposit"));
    }

    #[test]
    fn test_wrong_delegate_rejected() {
        let keyset = keyset();
        let (grant, token) = grant(&keyset, &["read:cycles"]);
        let request = AuthRequest::for_actor(&ActorRef::user("mallory")).with_token(token);
        let err = resolve(&request, &keyset, |_| Some(grant.clone()), Utc::now()).unwrap_err();
        assert_eq!(err.reason_code(), Some("invalid_delegation"));
    }

    #[test]
    fn test_revoked_grant_rejected_at_resolution() {
        let keyset = keyset();
        let (grant, token) = grant(&keyset, &["read:cycles"]);
        let mut revoked = grant.clone();
        revoked.revoked_at = Some(Utc::now());
        let request = AuthRequest::for_actor(&grant.delegate_actor).with_token(token);
        let err = resolve(&request, &keyset, |_| Some(revoked.clone()), Utc::now()).unwrap_err();
        assert_eq!(err.reason_code(), Some("delegation_revoked"));
    }

    #[test]
    fn test_scope_enforcement_respects_flag() {
        let context = AuthContext {
            actor: ActorRef::user("u1"),
            scopes: BTreeSet::new(),
            delegation: None,
            partner_tenant: None,
            now: Utc::now(),
        };
        let mut config = PolicyConfig::default();
        assert!(require_scopes(&config, &context, &["read:cycles"]).is_err());
        config.authz_enforce = false;
        assert!(require_scopes(&config, &context, &["read:cycles"]).is_ok());
    }

    #[test]
    fn test_tenancy_walls() {
        let config = PolicyConfig::default();
        let partner = AuthContext {
            actor: ActorRef::partner("p1"),
            scopes: BTreeSet::new(),
            delegation: None,
            partner_tenant: Some("p1".into()),
            now: Utc::now(),
        };
        assert!(require_tenancy(&config, &partner, Some("p1"), "proposal").is_ok());
        assert!(require_tenancy(&config, &partner, Some("p2"), "proposal").is_err());

        let admin = AuthContext {
            actor: ActorRef::admin("root"),
            scopes: BTreeSet::new(),
            delegation: None,
            partner_tenant: None,
            now: Utc::now(),
        };
        assert!(require_tenancy(&config, &admin, Some("p2"), "proposal").is_ok());
    }
}
