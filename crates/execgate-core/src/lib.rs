//! execgate core library
//!
//! Governs command execution requested by an agent: validates the request
//! against policy, optionally waits for a human approval, runs the process
//! with timeout/cancellation/kill escalation, captures bounded output and
//! formats a deterministic tool result.

pub mod approval;
pub mod config;
pub mod error;
pub mod format;
pub mod governor;
pub mod metrics;
pub mod obs;
pub mod outcome;
pub mod output;
pub mod policy;
pub mod request;
pub mod runner;
pub mod telemetry;
pub mod tool;

pub use approval::{
    ApprovalDecision, ApprovalError, ApprovalGate, ApprovalRequest, Approver, ApproverVerdict,
    ChannelApprover, GateState, PendingApproval, StaticApprover,
};
pub use config::{ApprovalMode, CommandList, ConfigError, ConfigResult, GovernorConfig};
pub use error::{ErrorKind, ExecError};
pub use format::{format, ContentBlock, Resolution, ToolResult};
pub use governor::ExecGovernor;
pub use metrics::METRICS;
pub use outcome::{ExecutionOutcome, TerminatedBy};
pub use output::{CapturedOutput, OutputBuffer, StreamKind};
pub use policy::{Policy, PolicyVerdict};
pub use request::{CommandRequest, RequestError, RequestResult};
pub use runner::{ProcessRunner, RunSpec, RunnerConfig, RunnerError};
pub use tool::{descriptor, ToolDescriptor, TOOL_LABEL, TOOL_NAME};

/// Re-exported so callers can cancel without depending on tokio-util directly.
pub use tokio_util::sync::CancellationToken;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
