//! Identity types for SwapRing
//!
//! All identity types are strongly typed wrappers around prefixed
//! strings to prevent accidental mixing of different ID types. The
//! inner representation is an opaque printable string so IDs arriving
//! from partners (or fixtures) survive round-trips unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Allocate a new random ID
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::new_v4()))
            }

            /// Wrap an existing ID string
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// The ID as a plain string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

// Marketplace identity types
define_id_type!(IntentId, "intent", "Unique identifier for a swap intent");
define_id_type!(ProposalId, "proposal", "Unique identifier for a cycle proposal");
define_id_type!(CommitId, "commit", "Unique identifier for an acceptance commit");
define_id_type!(CycleId, "cycle", "Unique identifier for an accepted settlement cycle");

// Settlement identity types
define_id_type!(ReceiptId, "receipt", "Unique identifier for a signed settlement receipt");
define_id_type!(HoldingId, "holding", "Unique identifier for a vault holding");
define_id_type!(ReservationId, "reservation", "Unique identifier for a vault reservation");
define_id_type!(SnapshotId, "snapshot", "Unique identifier for a custody snapshot");

// Governance identity types
define_id_type!(DelegationId, "delegation", "Unique identifier for a delegation grant");
define_id_type!(AuditEntryId, "audit", "Unique identifier for a policy audit entry");

/// An asset reference. Assets are external to the runtime; their IDs
/// are opaque strings supplied by intent owners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_id_prefix() {
        let id = IntentId::new();
        assert!(id.as_str().starts_with("intent_"));
    }

    #[test]
    fn test_id_roundtrip() {
        let id = ProposalId::from_string("proposal_fixture_1");
        let json = serde_json::to_string(&id).unwrap();
        let back: ProposalId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_ids_are_distinct() {
        assert_ne!(CycleId::new(), CycleId::new());
    }
}
