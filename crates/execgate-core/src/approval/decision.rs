//! Approval requests, approver answers and gate decisions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::request::CommandRequest;

/// What an approver is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub tool_call_id: String,
    pub command_line: String,
    pub cwd: Option<PathBuf>,
    /// Why the request was flagged.
    pub risk_summary: String,
    pub requested_at: DateTime<Utc>,
    /// SHA-256 over command, args and cwd. Identical requests share it.
    pub fingerprint: String,
}

impl ApprovalRequest {
    pub fn new(request: &CommandRequest, risk_summary: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            approval_id: Uuid::new_v4().to_string(),
            tool_call_id: request.tool_call_id.clone(),
            command_line: request.command_line(),
            cwd: request.cwd.clone(),
            risk_summary: risk_summary.into(),
            requested_at: now,
            fingerprint: fingerprint(request),
        }
    }
}

/// Stable digest of the parts of a request that decide what actually runs.
pub fn fingerprint(request: &CommandRequest) -> String {
    let payload = serde_json::json!({
        "command": request.command,
        "args": request.args,
        "cwd": request.cwd.as_ref().map(|p| p.to_string_lossy().into_owned()),
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// An approver's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApproverVerdict {
    Approved,
    Denied { reason: String },
}

/// Terminal state of an approval gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: String },
    /// No answer before the approval timeout. Treated like `Denied`.
    TimedOut,
}

impl ApprovalDecision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied { .. } => "denied",
            Self::TimedOut => "timed_out",
        }
    }
}

impl From<ApproverVerdict> for ApprovalDecision {
    fn from(v: ApproverVerdict) -> Self {
        match v {
            ApproverVerdict::Approved => Self::Approved,
            ApproverVerdict::Denied { reason } => Self::Denied { reason },
        }
    }
}
