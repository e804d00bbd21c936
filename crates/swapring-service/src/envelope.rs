//! Operation requests and response envelopes

use serde::Serialize;
use serde_json::Value;

use swapring_auth::AuthRequest;
use swapring_types::{ActorRef, SwapError};

/// A transport-delivered operation request
#[derive(Debug, Clone, Default)]
pub struct OperationRequest {
    pub auth: AuthRequest,
    pub idempotency_key: Option<String>,
    pub body: Value,
}

impl OperationRequest {
    pub fn new(actor: &ActorRef) -> Self {
        Self {
            auth: AuthRequest::for_actor(actor),
            idempotency_key: None,
            body: Value::Object(Default::default()),
        }
    }

    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.auth = self.auth.with_scopes(scopes);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth = self.auth.with_token(token);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// The contractual `{ok, body}` response shape
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replayed: Option<bool>,
    pub body: Value,
}

impl ResponseEnvelope {
    pub fn success(body: Value) -> Self {
        Self {
            ok: true,
            replayed: None,
            body,
        }
    }

    pub fn replayed(body: Value) -> Self {
        Self {
            ok: true,
            replayed: Some(true),
            body,
        }
    }

    pub fn error(err: &SwapError) -> Self {
        Self {
            ok: false,
            replayed: None,
            body: serde_json::json!({ "error": err.to_body() }),
        }
    }

    /// Stable error code of a failed envelope, if any
    pub fn error_code(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
    }

    /// `details.reason_code` of a failed envelope, if any
    pub fn reason_code(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|e| e.get("details"))
            .and_then(|d| d.get("reason_code"))
            .and_then(|c| c.as_str())
    }
}
