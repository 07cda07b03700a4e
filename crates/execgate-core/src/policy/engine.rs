//! Policy validation: denylist, cwd containment, allowlist, default to approval.

use std::path::{Path, PathBuf};

use crate::config::{ConfigResult, GovernorConfig};
use crate::request::CommandRequest;

use super::matcher::{CommandMatcher, NameMatch};
use super::roots::AllowedRoots;
use super::verdict::PolicyVerdict;

/// Compiled, read-only command policy.
///
/// Built once from a [`GovernorConfig`] and shared by every concurrent
/// execution.
#[derive(Debug, Clone)]
pub struct Policy {
    denylist: CommandMatcher,
    allowlist: CommandMatcher,
    roots: AllowedRoots,
}

impl Policy {
    pub fn from_config(config: &GovernorConfig) -> ConfigResult<Self> {
        Ok(Self {
            denylist: CommandMatcher::compile(&config.denylist, NameMatch::Basename)?,
            allowlist: CommandMatcher::compile(&config.allowlist, NameMatch::Exact)?,
            roots: AllowedRoots::resolve(&config.allowed_roots)?,
        })
    }

    pub fn roots(&self) -> &AllowedRoots {
        &self.roots
    }

    /// Canonical form of `cwd` if it is a directory inside the allowed roots.
    ///
    /// The runner spawns in the path returned here, resolved again after any
    /// approval wait, so a symlink swapped in the meantime cannot move the
    /// child outside the roots.
    pub fn resolve_cwd(&self, cwd: &Path) -> Result<PathBuf, String> {
        self.roots.check(cwd)
    }

    /// Validate a request.
    ///
    /// Checks run in order and the first violation wins: denylist, working
    /// directory, allowlist. Anything that falls through needs approval; an
    /// unknown command is never silently allowed.
    pub fn validate(&self, request: &CommandRequest) -> PolicyVerdict {
        let command_line = request.command_line();
        let raw_line = request.raw_line();

        let lines = [raw_line.as_str(), command_line.as_str()];
        if let Some(entry) = self.denylist.find(&request.command, &request.args, &lines) {
            return PolicyVerdict::Deny {
                reason: format!("command `{command_line}` matches denylist entry `{entry}`"),
            };
        }

        if let Some(cwd) = &request.cwd {
            if let Err(reason) = self.resolve_cwd(cwd) {
                return PolicyVerdict::Deny { reason };
            }
        }

        if self
            .allowlist
            .is_match(&request.command, &request.args, &[command_line.as_str()])
        {
            return PolicyVerdict::Allow;
        }

        PolicyVerdict::RequireApproval {
            risk_summary: command_line,
        }
    }
}
