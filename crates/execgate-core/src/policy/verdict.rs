//! Policy verdict type.

use serde::{Deserialize, Serialize};

/// Outcome of validating a command request against policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PolicyVerdict {
    /// Run without asking anyone.
    Allow,
    /// Never run.
    Deny { reason: String },
    /// Run only after an explicit approval.
    RequireApproval { risk_summary: String },
}

impl PolicyVerdict {
    /// Returns `true` when the verdict is `Allow`.
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyVerdict::Allow)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PolicyVerdict::Allow => "allow",
            PolicyVerdict::Deny { .. } => "deny",
            PolicyVerdict::RequireApproval { .. } => "require_approval",
        }
    }
}
