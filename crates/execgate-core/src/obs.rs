//! Structured observability hooks for governed executions.
//!
//! This module provides:
//! - An execution-scoped tracing span via the `ExecSpan` RAII guard
//! - Emission functions for the lifecycle of one request: requested, verdict,
//!   approval, spawn, termination, finish
//!
//! Events are emitted at `info!` level unless noted. Filter with `RUST_LOG`;
//! use `--json` on the CLI for JSON lines.

use tracing::{info, warn, Instrument};

use crate::outcome::TerminatedBy;

/// Span guard tagging every event inside one execution with its tool call id.
///
/// # Example
///
/// ```ignore
/// let span = ExecSpan::new("call-123");
/// span.in_scope(|| emit_exec_requested("call-123", "ls -la"));
/// ```
pub struct ExecSpan {
    span: tracing::Span,
}

impl ExecSpan {
    pub fn new(tool_call_id: &str) -> Self {
        Self {
            span: tracing::info_span!("execgate.exec", tool_call_id = %tool_call_id),
        }
    }

    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }

    /// Attach the span to a future (safe across `.await`).
    pub fn instrument<F: std::future::Future>(&self, fut: F) -> tracing::instrument::Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

/// Emit event: a request arrived.
pub fn emit_exec_requested(tool_call_id: &str, command_line: &str) {
    info!(event = "exec.requested", tool_call_id = %tool_call_id, command = %command_line);
}

/// Emit event: the policy produced a verdict.
pub fn emit_policy_verdict(tool_call_id: &str, verdict: &str) {
    info!(event = "exec.policy_verdict", tool_call_id = %tool_call_id, verdict = %verdict);
}

/// Emit event: the approval gate resolved.
pub fn emit_approval_resolved(tool_call_id: &str, decision: &str, waited_ms: u64) {
    info!(
        event = "exec.approval_resolved",
        tool_call_id = %tool_call_id,
        decision = %decision,
        waited_ms = waited_ms,
    );
}

/// Emit event: a child process started.
pub fn emit_process_spawned(pid: Option<u32>, command: &str, argc: usize) {
    info!(event = "exec.process_spawned", pid = ?pid, command = %command, argc = argc);
}

/// Emit event: a child process was reaped.
pub fn emit_process_terminated(
    pid: Option<u32>,
    terminated_by: &TerminatedBy,
    exit_code: Option<i32>,
    duration_ms: u64,
) {
    info!(
        event = "exec.process_terminated",
        pid = ?pid,
        terminated_by = %terminated_by.label(),
        exit_code = ?exit_code,
        duration_ms = duration_ms,
    );
}

/// Emit event: the request finished, with its taxonomy bucket if it failed.
pub fn emit_exec_finished(tool_call_id: &str, error_kind: Option<&str>, total_ms: u64) {
    match error_kind {
        None => info!(
            event = "exec.finished",
            tool_call_id = %tool_call_id,
            success = true,
            total_ms = total_ms,
        ),
        Some(kind) => info!(
            event = "exec.finished",
            tool_call_id = %tool_call_id,
            success = false,
            error_kind = %kind,
            total_ms = total_ms,
        ),
    }
}

/// Emit event: a child could not be reaped (warning level).
pub fn emit_orphaned_process(tool_call_id: &str, pid: Option<u32>) {
    warn!(event = "exec.orphaned_process", tool_call_id = %tool_call_id, pid = ?pid);
}
