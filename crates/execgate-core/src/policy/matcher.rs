//! Compiled executable / pattern matchers for deny and allow lists.

use std::path::Path;

use regex::Regex;

use crate::config::{CommandList, ConfigError, ConfigResult};

/// How bare executable names are compared with the requested command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// Compare against the basename, so `/usr/bin/rm` matches `rm`.
    Basename,
    /// Bare names only match bare commands; entries with `/` match exactly.
    Exact,
}

/// A [`CommandList`] with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CommandMatcher {
    executables: Vec<String>,
    patterns: Vec<Regex>,
    blocked_args: Vec<Regex>,
    mode: NameMatch,
}

fn compile_all(patterns: &[String]) -> ConfigResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ConfigError::Pattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

impl CommandMatcher {
    pub fn compile(list: &CommandList, mode: NameMatch) -> ConfigResult<Self> {
        Ok(Self {
            executables: list.executables.clone(),
            patterns: compile_all(&list.patterns)?,
            blocked_args: compile_all(&list.blocked_args)?,
            mode,
        })
    }

    /// Returns the entry that matched, if any.
    ///
    /// Patterns are tried against each of `lines`; an argument matching a
    /// blocked-argument pattern cancels any match.
    pub fn find(&self, command: &str, args: &[String], lines: &[&str]) -> Option<String> {
        if args
            .iter()
            .any(|arg| self.blocked_args.iter().any(|re| re.is_match(arg)))
        {
            return None;
        }
        if let Some(exe) = self
            .executables
            .iter()
            .find(|exe| self.name_matches(exe, command))
        {
            return Some(exe.clone());
        }
        self.patterns
            .iter()
            .find(|re| lines.iter().any(|line| re.is_match(line)))
            .map(|re| re.as_str().to_string())
    }

    pub fn is_match(&self, command: &str, args: &[String], lines: &[&str]) -> bool {
        self.find(command, args, lines).is_some()
    }

    fn name_matches(&self, entry: &str, command: &str) -> bool {
        match self.mode {
            NameMatch::Basename => {
                let base = Path::new(command)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(command);
                entry == command || entry == base
            }
            NameMatch::Exact => entry == command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(exes: &[&str], patterns: &[&str]) -> CommandList {
        CommandList {
            executables: exes.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            blocked_args: Vec::new(),
        }
    }

    fn args(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_basename_mode_matches_paths() {
        let m = CommandMatcher::compile(&list(&["rm"], &[]), NameMatch::Basename).unwrap();
        assert!(m.is_match("rm", &args(&["-f", "x"]), &["rm -f x"]));
        assert!(m.is_match("/bin/rm", &args(&["-f", "x"]), &["/bin/rm -f x"]));
        assert!(!m.is_match("rmdir", &args(&["x"]), &["rmdir x"]));
    }

    #[test]
    fn test_exact_mode_does_not_trust_paths() {
        let m = CommandMatcher::compile(&list(&["echo", "/usr/bin/env"], &[]), NameMatch::Exact)
            .unwrap();
        assert!(m.is_match("echo", &args(&["hi"]), &["echo hi"]));
        assert!(!m.is_match("/tmp/evil/echo", &args(&["hi"]), &["/tmp/evil/echo hi"]));
        assert!(m.is_match("/usr/bin/env", &[], &["/usr/bin/env"]));
    }

    #[test]
    fn test_pattern_match_reports_pattern() {
        let m = CommandMatcher::compile(&list(&[], &[r"^git status"]), NameMatch::Exact).unwrap();
        assert_eq!(
            m.find("git", &args(&["status", "--short"]), &["git status --short"]),
            Some("^git status".to_string())
        );
        assert_eq!(m.find("git", &args(&["push"]), &["git push"]), None);
    }

    #[test]
    fn test_pattern_tried_against_every_line() {
        let m = CommandMatcher::compile(&list(&[], &[r"rm -rf /$"]), NameMatch::Basename).unwrap();
        let a = args(&["-c", "rm -rf /"]);
        assert!(!m.is_match("sh", &a, &["sh -c 'rm -rf /'"]));
        assert!(m.is_match("sh", &a, &["sh -c 'rm -rf /'", "sh -c rm -rf /"]));
    }

    #[test]
    fn test_blocked_arg_cancels_match() {
        let mut l = list(&["git"], &[r"^git diff"]);
        l.blocked_args = vec![r"^--output(=|$)".to_string()];
        let m = CommandMatcher::compile(&l, NameMatch::Exact).unwrap();
        assert!(m.is_match("git", &args(&["diff"]), &["git diff"]));
        let a = args(&["diff", "--output=/tmp/x"]);
        assert_eq!(m.find("git", &a, &["git diff --output=/tmp/x"]), None);
        // matched per argument, not as a substring of the line
        assert!(m.is_match("git", &args(&["diff", "x--output"]), &["git diff x--output"]));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = CommandMatcher::compile(&list(&[], &["(unclosed"]), NameMatch::Exact)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }
}
