//! The execution governor: request → policy → approval → run → result.
//!
//! One `execute` call is one independent unit of work. The governor itself
//! only holds read-only configuration, the compiled policy, the approver and
//! the runner's spawn counter, so a single instance (behind an `Arc`) serves
//! any number of concurrent calls.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::approval::{ApprovalDecision, ApprovalError, ApprovalGate, Approver};
use crate::config::{ConfigResult, GovernorConfig};
use crate::error::ExecError;
use crate::format::{format, Resolution, ToolResult};
use crate::metrics::METRICS;
use crate::obs::{self, ExecSpan};
use crate::outcome::TerminatedBy;
use crate::policy::{Policy, PolicyVerdict};
use crate::request::{CommandRequest, RequestError, RequestResult};
use crate::runner::{ProcessRunner, RunSpec, RunnerConfig, RunnerError};

pub struct ExecGovernor {
    config: GovernorConfig,
    policy: Policy,
    approver: Arc<dyn Approver>,
    runner: ProcessRunner,
}

impl std::fmt::Debug for ExecGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecGovernor")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl ExecGovernor {
    /// Validate `config`, compile its policy and build a governor.
    pub fn new(config: GovernorConfig, approver: Arc<dyn Approver>) -> ConfigResult<Self> {
        config.validate()?;
        let policy = Policy::from_config(&config)?;
        let runner = ProcessRunner::new(RunnerConfig::from(&config));
        Ok(Self {
            config,
            policy,
            approver,
            runner,
        })
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Processes spawned by this governor so far.
    pub fn spawn_count(&self) -> u64 {
        self.runner.spawn_count()
    }

    /// Validate a request and return the policy verdict without running it.
    pub fn check(&self, request: &CommandRequest) -> RequestResult<PolicyVerdict> {
        request.validate()?;
        Ok(self.policy.validate(request))
    }

    /// Execute a request. Never fails: every outcome, including internal
    /// faults, comes back as a [`ToolResult`].
    pub async fn execute(&self, request: CommandRequest, cancel: CancellationToken) -> ToolResult {
        let span = ExecSpan::new(&request.tool_call_id);
        span.instrument(self.execute_in_span(request, cancel)).await
    }

    /// Execute raw tool-call parameters (see [`CommandRequest::from_params`]).
    pub async fn execute_params(
        &self,
        tool_call_id: &str,
        params: &Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        match CommandRequest::from_params(tool_call_id, params) {
            Ok(request) => self.execute(request, cancel).await,
            Err(e) => {
                tracing::warn!(tool_call_id = %tool_call_id, error = %e, "rejecting malformed tool call");
                METRICS.inc_executions();
                let placeholder = CommandRequest::new(tool_call_id, "", Vec::<String>::new());
                format(
                    &placeholder,
                    &Resolution::Rejected(ExecError::InvalidRequest(e.to_string())),
                )
            }
        }
    }

    async fn execute_in_span(&self, request: CommandRequest, cancel: CancellationToken) -> ToolResult {
        let started = Instant::now();
        METRICS.inc_executions();
        obs::emit_exec_requested(&request.tool_call_id, &request.command_line());

        let resolution = self.resolve(&request, &cancel).await;
        let result = format(&request, &resolution);

        let kind = result.error_kind();
        obs::emit_exec_finished(
            &request.tool_call_id,
            kind.as_ref().map(|k| k.as_str()),
            started.elapsed().as_millis() as u64,
        );
        result
    }

    async fn resolve(&self, request: &CommandRequest, cancel: &CancellationToken) -> Resolution {
        if let Err(e) = request.validate() {
            return Resolution::Rejected(invalid(e));
        }
        if cancel.is_cancelled() {
            METRICS.inc_cancellations();
            return Resolution::Rejected(ExecError::Cancelled);
        }

        let verdict = self.policy.validate(request);
        obs::emit_policy_verdict(&request.tool_call_id, verdict.label());
        match verdict {
            PolicyVerdict::Allow => {}
            PolicyVerdict::Deny { reason } => {
                METRICS.inc_denials();
                return Resolution::Rejected(ExecError::PolicyDenied { reason });
            }
            PolicyVerdict::RequireApproval { risk_summary } => {
                if let Err(e) = self.await_approval(request, &risk_summary, cancel).await {
                    return Resolution::Rejected(e);
                }
            }
        }

        // Cancelled between approval and spawn: nothing to kill yet.
        if cancel.is_cancelled() {
            METRICS.inc_cancellations();
            return Resolution::Rejected(ExecError::Cancelled);
        }

        // Resolve the cwd again now that any approval wait is over and spawn
        // in the canonical path, not the one the request named.
        let mut spec = RunSpec::from(request);
        if let Some(cwd) = &request.cwd {
            match self.policy.resolve_cwd(cwd) {
                Ok(resolved) => spec.cwd = Some(resolved),
                Err(reason) => {
                    tracing::warn!(
                        tool_call_id = %request.tool_call_id,
                        %reason,
                        "working directory changed before spawn"
                    );
                    METRICS.inc_denials();
                    return Resolution::Rejected(ExecError::PolicyDenied { reason });
                }
            }
        }

        let timeout = request.effective_timeout(self.config.default_timeout(), self.config.max_timeout());
        match self.runner.run(&spec, timeout, cancel).await {
            Ok(outcome) => {
                match outcome.terminated_by {
                    TerminatedBy::Timeout => METRICS.inc_timeouts(),
                    TerminatedBy::Cancellation => METRICS.inc_cancellations(),
                    _ => {}
                }
                Resolution::Completed(outcome)
            }
            Err(RunnerError::Spawn { command, source }) => {
                METRICS.inc_spawn_failures();
                Resolution::Rejected(ExecError::SpawnFailure { command, source })
            }
            Err(e) => {
                let pid = match &e {
                    RunnerError::Unreapable { pid, .. } | RunnerError::Wait { pid, .. } => *pid,
                    RunnerError::Spawn { .. } => None,
                };
                obs::emit_orphaned_process(&request.tool_call_id, pid);
                Resolution::Rejected(ExecError::InternalFault {
                    message: e.to_string(),
                    pid,
                })
            }
        }
    }

    /// Open a fresh gate for this request and map its decision.
    async fn await_approval(
        &self,
        request: &CommandRequest,
        risk_summary: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExecError> {
        METRICS.inc_approvals_requested();
        let started = Instant::now();
        let mut gate = ApprovalGate::new(request.tool_call_id.clone());
        let timeout = self.config.approval_timeout();

        let decision = gate
            .request_approval(self.approver.as_ref(), request, risk_summary, timeout, cancel)
            .await
            .map_err(|e: ApprovalError| ExecError::InternalFault {
                message: e.to_string(),
                pid: None,
            })?;
        obs::emit_approval_resolved(
            &request.tool_call_id,
            decision.label(),
            started.elapsed().as_millis() as u64,
        );

        match decision {
            ApprovalDecision::Approved => Ok(()),
            ApprovalDecision::Denied { .. } if cancel.is_cancelled() => {
                METRICS.inc_cancellations();
                Err(ExecError::Cancelled)
            }
            ApprovalDecision::Denied { reason } => {
                METRICS.inc_denials();
                Err(ExecError::ApprovalDenied { reason })
            }
            ApprovalDecision::TimedOut => {
                METRICS.inc_denials();
                Err(ExecError::ApprovalTimeout {
                    timeout_secs: self.config.approval_timeout_secs,
                })
            }
        }
    }
}

fn invalid(e: RequestError) -> ExecError {
    ExecError::InvalidRequest(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::StaticApprover;
    use crate::error::ErrorKind;
    use crate::request::MISSING_COMMAND;

    fn governor(approver: StaticApprover) -> ExecGovernor {
        ExecGovernor::new(GovernorConfig::default(), Arc::new(approver)).unwrap()
    }

    #[tokio::test]
    async fn test_empty_command_spawns_nothing() {
        let g = governor(StaticApprover::approve_all());
        let result = g
            .execute(
                CommandRequest::new("c", "", Vec::<String>::new()),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidRequest));
        assert_eq!(result.details["error"], MISSING_COMMAND);
        assert_eq!(g.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_params_missing_command() {
        let g = governor(StaticApprover::approve_all());
        let result = g
            .execute_params("c", &serde_json::json!({}), CancellationToken::new())
            .await;
        assert_eq!(result.text(), "Error: command parameter is required");
        assert_eq!(g.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_request_not_run() {
        let g = governor(StaticApprover::approve_all());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = g
            .execute(CommandRequest::new("c", "echo", ["hi"]), cancel)
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
        assert_eq!(g.spawn_count(), 0);
    }

    #[test]
    fn test_check_reports_verdict() {
        let g = governor(StaticApprover::approve_all());
        assert!(g
            .check(&CommandRequest::new("c", "echo", ["hi"]))
            .unwrap()
            .is_allowed());
        assert!(g
            .check(&CommandRequest::new("c", "", Vec::<String>::new()))
            .is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = GovernorConfig {
            output_cap_bytes: 0,
            ..GovernorConfig::default()
        };
        assert!(ExecGovernor::new(cfg, Arc::new(StaticApprover::approve_all())).is_err());
    }
}
