// src/config.rs
// Environment-based configuration for the transaction manager

use std::path::{Path, PathBuf};
use tracing::debug;

/// Default directory name for backups, created under the working directory
pub const DEFAULT_BACKUP_DIR: &str = ".rollback-backups";

/// Env var overriding the working directory backups are made relative to
pub const WORKDIR_ENV: &str = "FS_ROLLBACK_WORKDIR";

/// Env var overriding the backup root
pub const BACKUP_DIR_ENV: &str = "FS_ROLLBACK_BACKUP_DIR";

/// Where the transaction manager resolves paths from and stores backups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackConfig {
    /// Base for relative file paths and for the backup layout
    pub working_dir: PathBuf,
    /// Root of `{backup_root}/{operation_id}/{relative_path}`
    pub backup_root: PathBuf,
}

impl RollbackConfig {
    /// Config rooted at `working_dir` with the default backup directory
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        let backup_root = working_dir.join(DEFAULT_BACKUP_DIR);
        Self {
            working_dir,
            backup_root,
        }
    }

    /// Replace the backup root; relative roots resolve against the working directory
    pub fn with_backup_root(mut self, backup_root: impl AsRef<Path>) -> Self {
        self.backup_root = crate::utils::normalize_path(backup_root.as_ref(), &self.working_dir);
        self
    }

    /// Load from the process cwd and environment variables
    pub fn from_env() -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::from_lookup(&cwd, |name| std::env::var(name).ok()))
    }

    /// Build from an arbitrary variable lookup, filtering empty values
    pub fn from_lookup<F>(cwd: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let working_dir = read(WORKDIR_ENV)
            .map(|dir| crate::utils::normalize_path(Path::new(&dir), cwd))
            .unwrap_or_else(|| cwd.to_path_buf());

        let mut config = Self::new(working_dir);
        if let Some(root) = read(BACKUP_DIR_ENV) {
            config = config.with_backup_root(root);
        }

        debug!(
            working_dir = %config.working_dir.display(),
            backup_root = %config.backup_root.display(),
            "Rollback config loaded"
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_new_uses_default_backup_dir() {
        let config = RollbackConfig::new("/work");
        assert_eq!(config.working_dir, PathBuf::from("/work"));
        assert_eq!(config.backup_root, PathBuf::from("/work/.rollback-backups"));
    }

    #[test]
    fn test_from_lookup_defaults_to_cwd() {
        let config = RollbackConfig::from_lookup(Path::new("/cwd"), lookup(&[]));
        assert_eq!(config, RollbackConfig::new("/cwd"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = RollbackConfig::from_lookup(
            Path::new("/cwd"),
            lookup(&[(WORKDIR_ENV, "project"), (BACKUP_DIR_ENV, "/var/backups")]),
        );
        assert_eq!(config.working_dir, PathBuf::from("/cwd/project"));
        assert_eq!(config.backup_root, PathBuf::from("/var/backups"));
    }

    #[test]
    fn test_relative_backup_root_resolves_against_working_dir() {
        let config = RollbackConfig::from_lookup(
            Path::new("/cwd"),
            lookup(&[(BACKUP_DIR_ENV, "tmp/bak")]),
        );
        assert_eq!(config.backup_root, PathBuf::from("/cwd/tmp/bak"));
    }

    #[test]
    fn test_empty_values_ignored() {
        let config = RollbackConfig::from_lookup(
            Path::new("/cwd"),
            lookup(&[(WORKDIR_ENV, ""), (BACKUP_DIR_ENV, "   ")]),
        );
        assert_eq!(config, RollbackConfig::new("/cwd"));
    }
}
