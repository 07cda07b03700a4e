//! Working-directory containment.

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, ConfigResult};

/// Canonicalised set of directories a request may run in.
#[derive(Debug, Clone, Default)]
pub struct AllowedRoots {
    roots: Vec<PathBuf>,
}

impl AllowedRoots {
    /// Resolve every root once. A root that does not exist is a config error.
    pub fn resolve(roots: &[PathBuf]) -> ConfigResult<Self> {
        let roots = roots
            .iter()
            .map(|r| {
                std::fs::canonicalize(r).map_err(|source| ConfigError::Root {
                    path: r.clone(),
                    source,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { roots })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check that `cwd` resolves inside one of the roots.
    ///
    /// Symlinks and `..` are resolved before the prefix check, so neither can
    /// be used to step outside a root.
    pub fn check(&self, cwd: &Path) -> Result<PathBuf, String> {
        let resolved = std::fs::canonicalize(cwd)
            .map_err(|e| format!("working directory {} does not resolve: {e}", cwd.display()))?;
        if !resolved.is_dir() {
            return Err(format!(
                "working directory {} is not a directory",
                cwd.display()
            ));
        }
        if self.is_unrestricted() || self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            Err(format!(
                "working directory {} resolves to {}, outside the allowed roots",
                cwd.display(),
                resolved.display()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_root_ok() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("work");
        std::fs::create_dir(&sub).unwrap();

        let roots = AllowedRoots::resolve(&[dir.path().to_path_buf()]).unwrap();
        let resolved = roots.check(&sub).unwrap();
        assert!(resolved.ends_with("work"));
    }

    #[test]
    fn test_dotdot_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("work");
        std::fs::create_dir(&sub).unwrap();

        let roots = AllowedRoots::resolve(&[sub.clone()]).unwrap();
        let err = roots.check(&sub.join("..")).unwrap_err();
        assert!(err.contains("outside the allowed roots"));
    }

    #[test]
    fn test_missing_cwd_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let roots = AllowedRoots::resolve(&[dir.path().to_path_buf()]).unwrap();
        let err = roots.check(&dir.path().join("nope")).unwrap_err();
        assert!(err.contains("does not resolve"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let inside = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let link = inside.path().join("escape");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();

        let roots = AllowedRoots::resolve(&[inside.path().to_path_buf()]).unwrap();
        assert!(roots.check(&link).is_err());
    }

    #[test]
    fn test_unrestricted_accepts_any_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let roots = AllowedRoots::default();
        assert!(roots.is_unrestricted());
        assert!(roots.check(dir.path()).is_ok());
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let err = AllowedRoots::resolve(&[PathBuf::from("/no/such/root/anywhere")]).unwrap_err();
        assert!(matches!(err, ConfigError::Root { .. }));
    }
}
