//! Error types for the approval module.

/// Errors produced by approvers and the approval gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval gate for {tool_call_id} already used (state: {state})")]
    GateAlreadyUsed {
        tool_call_id: String,
        state: &'static str,
    },

    #[error("approver channel closed")]
    ChannelClosed,
}

/// Result type for approval operations.
pub type ApprovalResult<T> = std::result::Result<T, ApprovalError>;
