//! Actor references
//!
//! Every request and every owned resource is attributed to an actor.
//! Equality is by (type, id).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four actor classes the runtime distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    Partner,
    Admin,
    Service,
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Partner => "partner",
            Self::Admin => "admin",
            Self::Service => "service",
        };
        write!(f, "{}", s)
    }
}

/// Reference to an actor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorRef {
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub id: String,
}

impl ActorRef {
    pub fn new(actor_type: ActorType, id: impl Into<String>) -> Self {
        Self {
            actor_type,
            id: id.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(ActorType::User, id)
    }

    pub fn partner(id: impl Into<String>) -> Self {
        Self::new(ActorType::Partner, id)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(ActorType::Admin, id)
    }

    pub fn service(id: impl Into<String>) -> Self {
        Self::new(ActorType::Service, id)
    }

    /// Stable fingerprint used in idempotency scope keys
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.actor_type, self.id)
    }

    /// Parse a "type:id" pair as carried in transport headers
    pub fn parse(s: &str) -> Option<Self> {
        let (ty, id) = s.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        let actor_type = match ty {
            "user" => ActorType::User,
            "partner" => ActorType::Partner,
            "admin" => ActorType::Admin,
            "service" => ActorType::Service,
            _ => return None,
        };
        Some(Self::new(actor_type, id))
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.actor_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let actor = ActorRef::user("u1");
        let parsed = ActorRef::parse(&actor.fingerprint()).unwrap();
        assert_eq!(actor, parsed);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ActorRef::parse("useru1").is_none());
        assert!(ActorRef::parse("robot:r1").is_none());
        assert!(ActorRef::parse("user:").is_none());
    }

    #[test]
    fn test_equality_by_type_and_id() {
        assert_ne!(ActorRef::user("x"), ActorRef::partner("x"));
        assert_eq!(ActorRef::user("x"), ActorRef::user("x"));
    }
}
