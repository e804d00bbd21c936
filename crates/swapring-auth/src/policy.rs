//! Policy configuration from environment flags
//!
//! Built fresh per operation so a flag flipped mid-process (notably by
//! tests) takes effect on the next request.

/// Enforcement toggles and signing overrides
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Gate for scope and tenancy enforcement
    pub authz_enforce: bool,
    /// Gate for partner-program quota checks on settlement vault exports
    pub settlement_vault_export_partner_program_enforce: bool,
    /// Gate for rejecting exports of frozen rollout policies
    pub rollout_policy_freeze_export_enforce: bool,
    /// Gate for checkpoint continuity checks on rollout-policy diagnostics exports
    pub rollout_policy_diagnostics_export_checkpoint_enforce: bool,
    /// Overrides the key used to sign delegation tokens
    pub delegation_token_signing_active_key_id: Option<String>,
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name).ok().as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}

impl PolicyConfig {
    pub fn from_env() -> Self {
        Self {
            authz_enforce: env_flag("AUTHZ_ENFORCE", true),
            settlement_vault_export_partner_program_enforce: env_flag(
                "SETTLEMENT_VAULT_EXPORT_PARTNER_PROGRAM_ENFORCE",
                false,
            ),
            rollout_policy_freeze_export_enforce: env_flag(
                "PARTNER_PROGRAM_ROLLOUT_POLICY_FREEZE_EXPORT_ENFORCE",
                false,
            ),
            rollout_policy_diagnostics_export_checkpoint_enforce: env_flag(
                "PARTNER_PROGRAM_ROLLOUT_POLICY_DIAGNOSTICS_EXPORT_CHECKPOINT_ENFORCE",
                true,
            ),
            delegation_token_signing_active_key_id: std::env::var(
                "DELEGATION_TOKEN_SIGNING_ACTIVE_KEY_ID",
            )
            .ok()
            .filter(|v| !v.is_empty()),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            authz_enforce: true,
            settlement_vault_export_partner_program_enforce: false,
            rollout_policy_freeze_export_enforce: false,
            rollout_policy_diagnostics_export_checkpoint_enforce: true,
            delegation_token_signing_active_key_id: None,
        }
    }
}
