//! Governor configuration.
//!
//! Everything here is read-only once the governor is built. Load from a TOML
//! or JSON file, layer `EXECGATE_*` environment overrides on top, then
//! [`GovernorConfig::validate`] before handing it to the governor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("allowed root {path} does not resolve: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A set of executables and command-line patterns.
///
/// `executables` are plain names or paths; `patterns` are regular expressions
/// matched against the command line. A command that would otherwise match is
/// not matched when any single argument matches one of `blocked_args`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandList {
    pub executables: Vec<String>,
    pub patterns: Vec<String>,
    pub blocked_args: Vec<String>,
}

impl CommandList {
    pub fn is_empty(&self) -> bool {
        self.executables.is_empty() && self.patterns.is_empty()
    }
}

/// How requests that need approval are decided when no interactive
/// approver is wired in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Ask an operator.
    #[default]
    Prompt,
    AutoApprove,
    AutoDeny,
}

/// Full governor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GovernorConfig {
    /// Working directories must resolve inside one of these. Empty = any.
    pub allowed_roots: Vec<PathBuf>,
    /// Timeout applied when the request carries none (seconds).
    pub default_timeout_secs: f64,
    /// Requested timeouts above this are clamped (seconds).
    pub max_timeout_secs: f64,
    /// Per-stream byte cap for captured stdout/stderr.
    pub output_cap_bytes: usize,
    /// How long an approval may stay pending (seconds).
    pub approval_timeout_secs: u64,
    pub approval_mode: ApprovalMode,
    /// Wait between SIGTERM and SIGKILL (milliseconds).
    pub grace_period_ms: u64,
    /// Forced-kill attempts before giving up on reaping a child.
    pub kill_attempts: u32,
    /// Bound on draining pipes after the child is gone (milliseconds).
    pub output_drain_ms: u64,
    /// Commands that are always refused.
    pub denylist: CommandList,
    /// Commands that run without approval.
    pub allowlist: CommandList,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            denylist: CommandList {
                executables: [
                    "sudo", "su", "doas", "mkfs", "dd", "fdisk", "shutdown", "reboot", "halt",
                    "poweroff",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                patterns: vec![
                    // rm -rf /, rm -r -f /*, rm --recursive ~ (also inside `sh -c`)
                    r"(^|[\s;&|(/])rm\s+(-\S*\s+)*(-[A-Za-z]*[rR][A-Za-z]*|--recursive)\s+(-\S*\s+)*(/|/\*|~|~/|~/\*)($|[\s;&|)])"
                        .to_string(),
                    // :(){ :|:& };:
                    r":\(\)\s*\{".to_string(),
                ],
                blocked_args: Vec::new(),
            },
            allowlist: CommandList {
                executables: [
                    "echo", "pwd", "ls", "cat", "head", "tail", "wc", "date", "whoami", "uname",
                    "true", "false",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                patterns: vec![
                    r"^git (status|log|diff|show)( [^;&|`$']*)?$".to_string(),
                    // listing only; -d/-D/-m/-c change refs
                    r"^git branch( (-a|-r|-v|-vv|--all|--remotes|--verbose|--list|--show-current))*$"
                        .to_string(),
                ],
                // --output writes a file, --ext-diff runs a helper; git accepts
                // unambiguous prefixes of both
                blocked_args: vec![
                    r"^--o(u(t(p(u(t)?)?)?)?)?(=|$)".to_string(),
                    r"^--ext(-(d(i(f(f)?)?)?)?)?$".to_string(),
                ],
            },
            allowed_roots: Vec::new(),
            default_timeout_secs: 120.0,
            max_timeout_secs: 600.0,
            output_cap_bytes: 64 * 1024,
            approval_timeout_secs: 300,
            approval_mode: ApprovalMode::Prompt,
            grace_period_ms: 2_000,
            kill_attempts: 3,
            output_drain_ms: 2_000,
        }
    }
}

impl GovernorConfig {
    /// Load a config file. `.toml` files are parsed as TOML, anything else
    /// as JSON. Missing fields take their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            Ok(toml::from_str(&raw)?)
        } else {
            Ok(serde_json::from_str(&raw)?)
        }
    }

    /// Apply `EXECGATE_*` environment overrides.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> ConfigResult<T> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { var, value })
        }

        if let Some(v) = lookup("EXECGATE_DEFAULT_TIMEOUT_SECS") {
            self.default_timeout_secs = parse("EXECGATE_DEFAULT_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("EXECGATE_MAX_TIMEOUT_SECS") {
            self.max_timeout_secs = parse("EXECGATE_MAX_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("EXECGATE_OUTPUT_CAP_BYTES") {
            self.output_cap_bytes = parse("EXECGATE_OUTPUT_CAP_BYTES", v)?;
        }
        if let Some(v) = lookup("EXECGATE_APPROVAL_TIMEOUT_SECS") {
            self.approval_timeout_secs = parse("EXECGATE_APPROVAL_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("EXECGATE_GRACE_PERIOD_MS") {
            self.grace_period_ms = parse("EXECGATE_GRACE_PERIOD_MS", v)?;
        }
        if let Some(v) = lookup("EXECGATE_ALLOWED_ROOTS") {
            self.allowed_roots = std::env::split_paths(&v)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        Ok(self)
    }

    /// Reject configurations the governor cannot honour.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.default_timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "default_timeout_secs must be positive, got {}",
                self.default_timeout_secs
            )));
        }
        if !positive(self.max_timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "max_timeout_secs must be positive, got {}",
                self.max_timeout_secs
            )));
        }
        if self.max_timeout_secs < self.default_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "max_timeout_secs ({}) is below default_timeout_secs ({})",
                self.max_timeout_secs, self.default_timeout_secs
            )));
        }
        if self.output_cap_bytes == 0 {
            return Err(ConfigError::Invalid("output_cap_bytes must be > 0".into()));
        }
        if self.approval_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "approval_timeout_secs must be > 0".into(),
            ));
        }
        if self.kill_attempts == 0 {
            return Err(ConfigError::Invalid("kill_attempts must be > 0".into()));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        secs_to_duration(self.default_timeout_secs)
    }

    pub fn max_timeout(&self) -> Duration {
        secs_to_duration(self.max_timeout_secs)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn output_drain(&self) -> Duration {
        Duration::from_millis(self.output_drain_ms)
    }

    /// Render as TOML (for `execgate config`).
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Seconds to a `Duration`, saturating instead of panicking on huge or
/// non-finite input.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
