//! Error types for SwapRing
//!
//! Every failure crossing an operation boundary carries a stable
//! snake_case code; `details.reason_code` narrows the cause where a
//! code alone is too coarse.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for SwapRing operations
pub type Result<T> = std::result::Result<T, SwapError>;

/// SwapRing error taxonomy
#[derive(Debug, Clone, Error)]
pub enum SwapError {
    // ========================================================================
    // Request errors
    // ========================================================================

    /// Request failed schema or semantic validation
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Actor missing or malformed
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// Authenticated but not permitted
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Resource belongs to another partner tenant
    #[error("Tenancy forbidden for {resource}")]
    TenancyForbidden { resource: String },

    /// Missing required scope
    #[error("Insufficient scope: requires {required}")]
    InsufficientScope { required: String },

    // ========================================================================
    // Delegation errors
    // ========================================================================

    /// Delegation token failed decoding or verification
    #[error("Invalid delegation: {reason}")]
    InvalidDelegation { reason: String },

    /// Delegation grant outside its validity window
    #[error("Delegation {delegation_id} expired")]
    DelegationExpired { delegation_id: String },

    /// Delegation grant revoked
    #[error("Delegation {delegation_id} revoked")]
    DelegationRevoked { delegation_id: String },

    // ========================================================================
    // State errors
    // ========================================================================

    /// Resource not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic conflict; `reason_code` narrows the cause
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        reason_code: Option<String>,
    },

    /// Same idempotency scope key replayed with a different payload
    #[error("Idempotency conflict for scope key {scope_key}")]
    IdempotencyConflict { scope_key: String },

    /// Transition not listed in the settlement state machine
    #[error("Invalid state transition from {from} via {operation}")]
    InvalidStateTransition {
        from: String,
        operation: String,
        reason_code: Option<String>,
    },

    // ========================================================================
    // Export errors
    // ========================================================================

    /// Resumption triple does not match any saved checkpoint
    #[error("Invalid checkpoint: {message}")]
    InvalidCheckpoint { message: String },

    /// Signed payload failed hash or signature verification
    #[error("Tampered payload: {message}")]
    TamperedPayload { message: String },

    // ========================================================================
    // Policy errors
    // ========================================================================

    /// Export or operation quota exhausted
    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// Feature gated off by configuration
    #[error("Feature disabled: {feature}")]
    FeatureDisabled { feature: String },

    /// Rate limit exceeded
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// Rollout policy is frozen for this partner
    #[error("Policy frozen for partner {partner_id}")]
    PolicyFrozen { partner_id: String },

    /// Runtime is in maintenance mode
    #[error("Maintenance mode")]
    MaintenanceMode,

    // ========================================================================
    // Crypto errors
    // ========================================================================

    /// Signature failed verification
    #[error("Invalid signature: {reason}")]
    SignatureInvalid { reason: String },

    /// Signature references a key the key set does not hold
    #[error("Unknown key id: {key_id}")]
    UnknownKeyId { key_id: String },

    // ========================================================================
    // Infrastructure errors
    // ========================================================================

    /// Dependency unavailable
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SwapError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            reason_code: None,
        }
    }

    pub fn conflict_with_reason(
        message: impl Into<String>,
        reason_code: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            message: message.into(),
            reason_code: Some(reason_code.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_transition(
        from: impl Into<String>,
        operation: impl Into<String>,
        reason_code: Option<&str>,
    ) -> Self {
        Self::InvalidStateTransition {
            from: from.into(),
            operation: operation.into(),
            reason_code: reason_code.map(|s| s.to_string()),
        }
    }

    /// Stable wire code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Unauthenticated { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::TenancyForbidden { .. } => "tenancy_forbidden",
            Self::InsufficientScope { .. } => "forbidden",
            Self::InvalidDelegation { .. } => "unauthorized",
            Self::DelegationExpired { .. } => "unauthorized",
            Self::DelegationRevoked { .. } => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::IdempotencyConflict { .. } => "idempotency_conflict",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::InvalidCheckpoint { .. } => "invalid_checkpoint",
            Self::TamperedPayload { .. } => "tampered_payload",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::FeatureDisabled { .. } => "feature_disabled",
            Self::RateLimited { .. } => "rate_limited",
            Self::PolicyFrozen { .. } => "policy_frozen",
            Self::MaintenanceMode => "maintenance_mode",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::UnknownKeyId { .. } => "unknown_key_id",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Narrower cause carried under `details.reason_code`
    pub fn reason_code(&self) -> Option<&str> {
        match self {
            Self::InvalidStateTransition { reason_code, .. } => reason_code.as_deref(),
            Self::Conflict { reason_code, .. } => reason_code.as_deref(),
            Self::InsufficientScope { .. } => Some("insufficient_scope"),
            Self::InvalidDelegation { .. } => Some("invalid_delegation"),
            Self::DelegationExpired { .. } => Some("delegation_expired"),
            Self::DelegationRevoked { .. } => Some("delegation_revoked"),
            _ => None,
        }
    }

    /// Structured details for the error body
    pub fn details(&self) -> serde_json::Value {
        let mut details = serde_json::Map::new();
        if let Some(reason) = self.reason_code() {
            details.insert(
                "reason_code".to_string(),
                serde_json::Value::String(reason.to_string()),
            );
        }
        match self {
            Self::NotFound { resource, id } => {
                details.insert("resource".into(), serde_json::json!(resource));
                details.insert("id".into(), serde_json::json!(id));
            }
            Self::InvalidStateTransition {
                from, operation, ..
            } => {
                details.insert("from".into(), serde_json::json!(from));
                details.insert("operation".into(), serde_json::json!(operation));
            }
            Self::IdempotencyConflict { scope_key } => {
                details.insert("scope_key".into(), serde_json::json!(scope_key));
            }
            Self::UnknownKeyId { key_id } => {
                details.insert("key_id".into(), serde_json::json!(key_id));
            }
            Self::PolicyFrozen { partner_id } => {
                details.insert("partner_id".into(), serde_json::json!(partner_id));
            }
            _ => {}
        }
        serde_json::Value::Object(details)
    }

    /// Serialize to the contractual error body
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// The error block of a `{ok:false}` response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}
