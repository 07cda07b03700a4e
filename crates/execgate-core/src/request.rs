//! Command requests as issued by the agent.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message used when a tool call omits `command`.
pub const MISSING_COMMAND: &str = "command parameter is required";

/// Errors produced while building or validating a [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("command parameter is required")]
    MissingCommand,

    #[error("{field} must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("{field} contains a NUL byte")]
    NulByte { field: &'static str },

    #[error("timeoutSec must be a positive finite number, got {0}")]
    InvalidTimeout(String),
}

/// Result type for request operations.
pub type RequestResult<T> = std::result::Result<T, RequestError>;

/// A single command execution requested by a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Opaque id of the tool call this request belongs to.
    pub tool_call_id: String,
    /// Executable to run (name resolved via `PATH`, or a path).
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<f64>,
}

impl CommandRequest {
    pub fn new(
        tool_call_id: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout_sec: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout_sec(mut self, secs: f64) -> Self {
        self.timeout_sec = Some(secs);
        self
    }

    /// Build a request from loosely typed tool-call parameters:
    /// `{ command: string, args?: string[], cwd?: string, timeoutSec?: number }`.
    ///
    /// `null` is treated the same as an absent field.
    pub fn from_params(tool_call_id: impl Into<String>, params: &Value) -> RequestResult<Self> {
        let field = |name: &str| params.get(name).filter(|v| !v.is_null());

        let command = match field("command") {
            None => return Err(RequestError::MissingCommand),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(RequestError::WrongType {
                    field: "command",
                    expected: "a string",
                })
            }
        };

        let args = match field("args") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(RequestError::WrongType {
                        field: "args",
                        expected: "an array of strings",
                    }),
                })
                .collect::<RequestResult<Vec<_>>>()?,
            Some(_) => {
                return Err(RequestError::WrongType {
                    field: "args",
                    expected: "an array of strings",
                })
            }
        };

        let cwd = match field("cwd") {
            None => None,
            Some(Value::String(s)) => Some(PathBuf::from(s)),
            Some(_) => {
                return Err(RequestError::WrongType {
                    field: "cwd",
                    expected: "a string",
                })
            }
        };

        let timeout_sec = match field("timeoutSec") {
            None => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(_) => {
                return Err(RequestError::WrongType {
                    field: "timeoutSec",
                    expected: "a number",
                })
            }
        };

        Ok(Self {
            tool_call_id: tool_call_id.into(),
            command,
            args,
            cwd,
            timeout_sec,
        })
    }

    /// Check the request's structural invariants.
    pub fn validate(&self) -> RequestResult<()> {
        if self.command.trim().is_empty() {
            return Err(RequestError::MissingCommand);
        }
        if self.command.contains('\0') {
            return Err(RequestError::NulByte { field: "command" });
        }
        if self.args.iter().any(|a| a.contains('\0')) {
            return Err(RequestError::NulByte { field: "args" });
        }
        if let Some(cwd) = &self.cwd {
            if cwd.to_string_lossy().contains('\0') {
                return Err(RequestError::NulByte { field: "cwd" });
            }
        }
        if let Some(t) = self.timeout_sec {
            if !t.is_finite() || t <= 0.0 {
                return Err(RequestError::InvalidTimeout(t.to_string()));
            }
        }
        Ok(())
    }

    /// Timeout to enforce: the requested one clamped to `max`, or `default`.
    pub fn effective_timeout(&self, default: Duration, max: Duration) -> Duration {
        match self.timeout_sec {
            Some(t) if t.is_finite() && t > 0.0 => {
                let requested = Duration::try_from_secs_f64(t).unwrap_or(max);
                requested.min(max)
            }
            _ => default.min(max),
        }
    }

    /// Command and arguments joined by single spaces, without quoting.
    ///
    /// Denylist patterns see this form too, so `rm -rf '/*'` cannot hide
    /// behind its quotes and a `sh -c` script is matched as written.
    pub fn raw_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Shell-quoted rendering of command and arguments.
    ///
    /// This is what approvers see and what allowlist patterns match against.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.command)
            .chain(self.args.iter())
            .map(|part| shell_escape::escape(Cow::Borrowed(part.as_str())).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
