//! What happened to a process that actually ran.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Why a process stopped, when it did not simply exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminatedBy {
    /// Exited on its own.
    None,
    /// Killed by the governor after the timeout elapsed.
    Timeout,
    /// Killed by the governor because the caller cancelled.
    Cancellation,
    /// Died from a signal the governor did not send (e.g. `SIGSEGV`).
    Signal(String),
}

impl TerminatedBy {
    /// Wire form used in `details.terminatedBy`.
    pub fn label(&self) -> String {
        match self {
            TerminatedBy::None => "none".to_string(),
            TerminatedBy::Timeout => "timeout".to_string(),
            TerminatedBy::Cancellation => "cancellation".to_string(),
            TerminatedBy::Signal(name) => format!("signal:{name}"),
        }
    }
}

/// Result of one process run, moved from the runner to the formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    /// Wall clock from spawn to final reap.
    pub duration_ms: u64,
    pub terminated_by: TerminatedBy,
    pub pid: Option<u32>,
}

impl ExecutionOutcome {
    /// Taxonomy bucket, or `None` for a clean success.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.terminated_by {
            TerminatedBy::Timeout => Some(ErrorKind::ExecutionTimeout),
            TerminatedBy::Cancellation => Some(ErrorKind::Cancelled),
            TerminatedBy::Signal(_) => Some(ErrorKind::AbnormalTermination),
            TerminatedBy::None if self.exit_code == Some(0) => None,
            TerminatedBy::None => Some(ErrorKind::AbnormalTermination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(exit_code: Option<i32>, terminated_by: TerminatedBy) -> ExecutionOutcome {
        ExecutionOutcome {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            duration_ms: 5,
            terminated_by,
            pid: Some(1),
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(TerminatedBy::None.label(), "none");
        assert_eq!(TerminatedBy::Timeout.label(), "timeout");
        assert_eq!(TerminatedBy::Cancellation.label(), "cancellation");
        assert_eq!(
            TerminatedBy::Signal("SIGSEGV".into()).label(),
            "signal:SIGSEGV"
        );
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(outcome(Some(0), TerminatedBy::None).error_kind(), None);
        assert_eq!(
            outcome(Some(2), TerminatedBy::None).error_kind(),
            Some(ErrorKind::AbnormalTermination)
        );
        assert_eq!(
            outcome(None, TerminatedBy::Timeout).error_kind(),
            Some(ErrorKind::ExecutionTimeout)
        );
        assert_eq!(
            outcome(None, TerminatedBy::Cancellation).error_kind(),
            Some(ErrorKind::Cancelled)
        );
        assert_eq!(
            outcome(None, TerminatedBy::Signal("SIGKILL".into())).error_kind(),
            Some(ErrorKind::AbnormalTermination)
        );
    }
}
