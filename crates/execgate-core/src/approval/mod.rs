//! Approval workflow for commands the policy will not allow outright.
//!
//! - **Gate**: a per-request state machine that resolves one decision,
//!   racing the approver against a timeout and request cancellation.
//! - **Approvers**: the async seam to whoever decides (`Approver` trait),
//!   with static and channel-backed implementations.
//! - **Requests**: what the approver sees, including a SHA-256 fingerprint
//!   of the command so repeat requests are recognisable.

pub mod approvers;
pub mod decision;
pub mod error;
pub mod gate;

pub use approvers::{Approver, ChannelApprover, PendingApproval, StaticApprover};
pub use decision::{fingerprint, ApprovalDecision, ApprovalRequest, ApproverVerdict};
pub use error::{ApprovalError, ApprovalResult};
pub use gate::{ApprovalGate, GateState, CANCELLED_WHILE_PENDING};
