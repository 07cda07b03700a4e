//! Error taxonomy for governed execution.
//!
//! Every failure the governor can hit is normalised into an [`ExecError`]
//! before it reaches the formatter. Nothing in this module ever escapes
//! `ExecGovernor::execute` as a raw error.

use serde::{Deserialize, Serialize};

/// Stable classification of an execution failure.
///
/// Serialized into `details.errorKind` of a `ToolResult`, so the names are
/// part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    PolicyDenied,
    ApprovalTimeout,
    SpawnFailure,
    ExecutionTimeout,
    Cancelled,
    AbnormalTermination,
    InternalFault,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::PolicyDenied => "policy_denied",
            ErrorKind::ApprovalTimeout => "approval_timeout",
            ErrorKind::SpawnFailure => "spawn_failure",
            ErrorKind::ExecutionTimeout => "execution_timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::AbnormalTermination => "abnormal_termination",
            ErrorKind::InternalFault => "internal_fault",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that short-circuits execution before an outcome exists.
///
/// Timeouts and abnormal exits of a process that *did* run are not errors
/// here; they are carried on the `ExecutionOutcome` itself.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("denied by policy: {reason}")]
    PolicyDenied { reason: String },

    #[error("not approved: {reason}")]
    ApprovalDenied { reason: String },

    #[error("approval timed out after {timeout_secs}s")]
    ApprovalTimeout { timeout_secs: u64 },

    #[error("failed to start {command}: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request cancelled before execution")]
    Cancelled,

    #[error("internal fault: {message}")]
    InternalFault { message: String, pid: Option<u32> },
}

impl ExecError {
    /// Taxonomy bucket for this error.
    ///
    /// Approval denials share the `policy_denied` bucket with validator
    /// denials; the distinction survives in the human-readable text.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ExecError::PolicyDenied { .. } | ExecError::ApprovalDenied { .. } => {
                ErrorKind::PolicyDenied
            }
            ExecError::ApprovalTimeout { .. } => ErrorKind::ApprovalTimeout,
            ExecError::SpawnFailure { .. } => ErrorKind::SpawnFailure,
            ExecError::Cancelled => ErrorKind::Cancelled,
            ExecError::InternalFault { .. } => ErrorKind::InternalFault,
        }
    }

    /// Process id left behind for external cleanup, if any.
    pub fn orphan_pid(&self) -> Option<u32> {
        match self {
            ExecError::InternalFault { pid, .. } => *pid,
            _ => None,
        }
    }
}
