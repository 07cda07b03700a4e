//! Tool results: the only artifact the orchestrator ever sees.
//!
//! `content[].text` is stable byte-for-byte and `details` keys are stable
//! camelCase; transcripts depend on both. Formatting is deterministic and
//! never fails: if the details payload cannot be built, a generic
//! `internal_fault` result is returned instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ExecError};
use crate::outcome::{ExecutionOutcome, TerminatedBy};
use crate::request::CommandRequest;

/// One block of tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// The externally visible response to one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    pub details: Value,
}

impl ToolResult {
    /// Concatenated text of all content blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `details.errorKind`, if this result reports a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.details
            .get("errorKind")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Last-resort payload when formatting itself fails.
    pub fn internal_fault(message: &str) -> Self {
        let mut details = serde_json::Map::new();
        details.insert("error".into(), Value::String(message.to_string()));
        details.insert(
            "errorKind".into(),
            Value::String(ErrorKind::InternalFault.as_str().to_string()),
        );
        Self {
            content: vec![ContentBlock::text(format!("Error: {message}"))],
            details: Value::Object(details),
        }
    }
}

/// How a request ended, as handed to the formatter.
#[derive(Debug)]
pub enum Resolution {
    /// Stopped before (or instead of) running.
    Rejected(ExecError),
    /// The process ran; it may still have failed or been killed.
    Completed(ExecutionOutcome),
}

/// Structured `details` for a short-circuited request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectedDetails<'a> {
    error: String,
    error_kind: ErrorKind,
    command: &'a str,
    args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
}

/// Structured `details` for a process that ran.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletedDetails<'a> {
    command: &'a str,
    args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    cwd: Option<String>,
    exit_code: Option<i32>,
    stdout: &'a str,
    stderr: &'a str,
    stdout_truncated: bool,
    stderr_truncated: bool,
    duration_ms: u64,
    terminated_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

/// Build the [`ToolResult`] for a request.
pub fn format(request: &CommandRequest, resolution: &Resolution) -> ToolResult {
    let built = match resolution {
        Resolution::Rejected(err) => format_rejected(request, err),
        Resolution::Completed(outcome) => format_completed(request, outcome),
    };
    built.unwrap_or_else(|e| ToolResult::internal_fault(&format!("failed to format result: {e}")))
}

fn cwd_string(request: &CommandRequest) -> Option<String> {
    request
        .cwd
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
}

fn format_rejected(request: &CommandRequest, err: &ExecError) -> serde_json::Result<ToolResult> {
    let command_line = request.command_line();
    let text = match err {
        ExecError::InvalidRequest(msg) => format!("Error: {msg}"),
        ExecError::PolicyDenied { reason } => {
            format!("Command `{command_line}` was denied by policy and was not run: {reason}")
        }
        ExecError::ApprovalDenied { reason } => {
            format!("Command `{command_line}` was not approved and was not run: {reason}")
        }
        ExecError::ApprovalTimeout { timeout_secs } => format!(
            "Command `{command_line}` was not run: no approval decision within {timeout_secs}s."
        ),
        ExecError::SpawnFailure { source, .. } => {
            format!("Command `{command_line}` failed to start: {source}")
        }
        ExecError::Cancelled => {
            format!("Command `{command_line}` was not run: the request was cancelled.")
        }
        ExecError::InternalFault { message, pid } => match pid {
            Some(pid) => format!(
                "Error: internal fault while running `{command_line}`: {message} (pid {pid} may need manual cleanup)"
            ),
            None => format!("Error: internal fault while running `{command_line}`: {message}"),
        },
    };

    let error = match err {
        ExecError::InvalidRequest(msg) => msg.clone(),
        other => other.to_string(),
    };
    let details = serde_json::to_value(RejectedDetails {
        error,
        error_kind: err.kind(),
        command: &request.command,
        args: &request.args,
        cwd: cwd_string(request),
        pid: err.orphan_pid(),
    })?;

    Ok(ToolResult {
        content: vec![ContentBlock::text(text)],
        details,
    })
}

fn format_completed(
    request: &CommandRequest,
    outcome: &ExecutionOutcome,
) -> serde_json::Result<ToolResult> {
    let command_line = request.command_line();
    let exit = match outcome.exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    };

    let mut text = match &outcome.terminated_by {
        TerminatedBy::None => format!(
            "Command `{command_line}` exited with {exit} after {}ms.",
            outcome.duration_ms
        ),
        TerminatedBy::Timeout => format!(
            "Command `{command_line}` was terminated after exceeding its timeout ({exit}, ran {}ms).",
            outcome.duration_ms
        ),
        TerminatedBy::Cancellation => format!(
            "Command `{command_line}` was terminated because the request was cancelled ({exit}, ran {}ms).",
            outcome.duration_ms
        ),
        TerminatedBy::Signal(name) => format!(
            "Command `{command_line}` was killed by signal {name} after {}ms.",
            outcome.duration_ms
        ),
    };

    push_stream(&mut text, "stdout", &outcome.stdout, outcome.stdout_truncated);
    push_stream(&mut text, "stderr", &outcome.stderr, outcome.stderr_truncated);

    let details = serde_json::to_value(CompletedDetails {
        command: &request.command,
        args: &request.args,
        cwd: cwd_string(request),
        exit_code: outcome.exit_code,
        stdout: &outcome.stdout,
        stderr: &outcome.stderr,
        stdout_truncated: outcome.stdout_truncated,
        stderr_truncated: outcome.stderr_truncated,
        duration_ms: outcome.duration_ms,
        terminated_by: outcome.terminated_by.label(),
        error_kind: outcome.error_kind(),
    })?;

    Ok(ToolResult {
        content: vec![ContentBlock::text(text)],
        details,
    })
}

fn push_stream(text: &mut String, name: &str, body: &str, truncated: bool) {
    if body.is_empty() && !truncated {
        return;
    }
    text.push_str("\n\n");
    text.push_str(name);
    text.push_str(":\n");
    text.push_str(body);
    if truncated {
        if !body.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("[output truncated]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::MISSING_COMMAND;

    fn outcome(terminated_by: TerminatedBy, exit_code: Option<i32>) -> ExecutionOutcome {
        ExecutionOutcome {
            exit_code,
            stdout: "hi\n".into(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            duration_ms: 12,
            terminated_by,
            pid: Some(99),
        }
    }

    #[test]
    fn test_missing_command_text_matches_tool_contract() {
        let req = CommandRequest::new("c", "", Vec::<String>::new());
        let result = format(
            &req,
            &Resolution::Rejected(ExecError::InvalidRequest(MISSING_COMMAND.into())),
        );
        assert_eq!(result.text(), "Error: command parameter is required");
        assert_eq!(result.details["error"], "command parameter is required");
        assert_eq!(result.details["errorKind"], "invalid_request");
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidRequest));
    }

    #[test]
    fn test_success_details() {
        let req = CommandRequest::new("c", "echo", ["hi"]);
        let result = format(
            &req,
            &Resolution::Completed(outcome(TerminatedBy::None, Some(0))),
        );
        let d = &result.details;
        assert_eq!(d["exitCode"], 0);
        assert_eq!(d["stdout"], "hi\n");
        assert_eq!(d["stderr"], "");
        assert_eq!(d["stdoutTruncated"], false);
        assert_eq!(d["stderrTruncated"], false);
        assert_eq!(d["durationMs"], 12);
        assert_eq!(d["terminatedBy"], "none");
        assert!(d.get("errorKind").is_none());
        assert!(d.get("error").is_none());
        assert_eq!(
            result.text(),
            "Command `echo hi` exited with exit code 0 after 12ms.\n\nstdout:\nhi\n"
        );
    }

    #[test]
    fn test_timeout_text_and_kind() {
        let req = CommandRequest::new("c", "sleep", ["10"]);
        let mut o = outcome(TerminatedBy::Timeout, None);
        o.stdout.clear();
        let result = format(&req, &Resolution::Completed(o));
        assert!(result.text().contains("terminated after exceeding its timeout"));
        assert_eq!(result.details["terminatedBy"], "timeout");
        assert_eq!(result.details["exitCode"], Value::Null);
        assert_eq!(result.error_kind(), Some(ErrorKind::ExecutionTimeout));
    }

    #[test]
    fn test_cancellation_text() {
        let req = CommandRequest::new("c", "sleep", ["10"]);
        let result = format(
            &req,
            &Resolution::Completed(outcome(TerminatedBy::Cancellation, None)),
        );
        assert!(result.text().contains("because the request was cancelled"));
        assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_truncation_marker() {
        let req = CommandRequest::new("c", "yes", Vec::<String>::new());
        let mut o = outcome(TerminatedBy::None, Some(0));
        o.stdout = "y\ny".into();
        o.stdout_truncated = true;
        let result = format(&req, &Resolution::Completed(o));
        assert!(result.text().ends_with("stdout:\ny\ny\n[output truncated]"));
        assert_eq!(result.details["stdoutTruncated"], true);
    }

    #[test]
    fn test_policy_denied() {
        let req = CommandRequest::new("c", "sudo", ["ls"]);
        let result = format(
            &req,
            &Resolution::Rejected(ExecError::PolicyDenied {
                reason: "sudo is denylisted".into(),
            }),
        );
        assert!(result.text().contains("denied by policy"));
        assert!(result.text().contains("sudo is denylisted"));
        assert_eq!(result.details["errorKind"], "policy_denied");
        assert_eq!(result.details["command"], "sudo");
    }

    #[test]
    fn test_internal_fault_carries_pid() {
        let req = CommandRequest::new("c", "stubborn", Vec::<String>::new());
        let result = format(
            &req,
            &Resolution::Rejected(ExecError::InternalFault {
                message: "could not reap".into(),
                pid: Some(4242),
            }),
        );
        assert_eq!(result.details["pid"], 4242);
        assert!(result.text().contains("pid 4242"));
    }

    #[test]
    fn test_format_is_byte_identical() {
        let req = CommandRequest::new("c", "echo", ["hi"]).with_cwd("/tmp");
        let resolution = Resolution::Completed(outcome(TerminatedBy::None, Some(0)));
        let a = serde_json::to_string(&format(&req, &resolution)).unwrap();
        let b = serde_json::to_string(&format(&req, &resolution)).unwrap();
        assert_eq!(a, b);

        let resolution = Resolution::Rejected(ExecError::ApprovalTimeout { timeout_secs: 30 });
        let a = serde_json::to_string(&format(&req, &resolution)).unwrap();
        let b = serde_json::to_string(&format(&req, &resolution)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_block_serializes_type() {
        let v = serde_json::to_value(ContentBlock::text("x")).unwrap();
        assert_eq!(v, serde_json::json!({"type": "text", "text": "x"}));
    }
}
