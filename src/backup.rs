// src/backup.rs
// Backup store - captures pristine file copies before mutation and restores them

use crate::error::ActionError;
use crate::utils::{content_hash, relative_backup_path};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Pre-image of a file touched by an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBackup {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    /// Present only when the file existed before the operation touched it
    pub original_content: Option<Vec<u8>>,
    pub existed: bool,
    pub content_hash: Option<String>,
}

/// What restoring a backup did to the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Rewritten,
    Unchanged,
    Removed,
    AlreadyAbsent,
}

/// On-disk store of pristine copies, laid out as `{root}/{operation_id}/{relative_path}`
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    working_dir: PathBuf,
}

impl BackupStore {
    pub fn new(root: PathBuf, working_dir: PathBuf) -> Self {
        Self { root, working_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every backup of one operation
    pub fn operation_dir(&self, operation_id: &str) -> PathBuf {
        self.root.join(operation_id)
    }

    /// Where the pristine copy of `original_path` lives for `operation_id`
    pub fn backup_path_for(&self, operation_id: &str, original_path: &Path) -> PathBuf {
        self.operation_dir(operation_id)
            .join(relative_backup_path(original_path, &self.working_dir))
    }

    /// Create the backup root if absent
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Capture the current state of `original_path` (absolute) and persist it.
    ///
    /// A missing file is recorded as `existed = false` and nothing is written.
    pub async fn capture(
        &self,
        operation_id: &str,
        original_path: &Path,
    ) -> std::io::Result<FileBackup> {
        let backup = self.snapshot(operation_id, original_path).await?;
        self.persist(&backup).await?;
        Ok(backup)
    }

    /// Read the pre-image of `original_path` without touching the backup tree
    pub async fn snapshot(
        &self,
        operation_id: &str,
        original_path: &Path,
    ) -> std::io::Result<FileBackup> {
        let backup_path = self.backup_path_for(operation_id, original_path);

        let content = match fs::read(original_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(
                    "[BACKUP] {} does not exist yet, recording absence",
                    original_path.display()
                );
                return Ok(FileBackup {
                    original_path: original_path.to_path_buf(),
                    backup_path,
                    original_content: None,
                    existed: false,
                    content_hash: None,
                });
            }
            Err(e) => return Err(e),
        };

        let hash = content_hash(&content);
        Ok(FileBackup {
            original_path: original_path.to_path_buf(),
            backup_path,
            original_content: Some(content),
            existed: true,
            content_hash: Some(hash),
        })
    }

    /// Write the pristine copy of a snapshot to `backup.backup_path`
    pub async fn persist(&self, backup: &FileBackup) -> std::io::Result<()> {
        let Some(content) = &backup.original_content else {
            return Ok(());
        };

        if let Some(parent) = backup.backup_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&backup.backup_path, content).await?;

        debug!(
            "[BACKUP] Captured {} -> {} ({} bytes, hash: {})",
            backup.original_path.display(),
            backup.backup_path.display(),
            content.len(),
            backup.content_hash.as_deref().map_or("", |h| &h[..12])
        );
        Ok(())
    }

    /// Put `backup.original_path` back into its captured state
    pub async fn restore(&self, backup: &FileBackup) -> Result<RestoreOutcome, ActionError> {
        if backup.existed {
            let content = self.load_content(backup).await?;
            self.write_content(&backup.original_path, &content, backup.content_hash.as_deref())
                .await
        } else {
            remove_if_present(&backup.original_path).await
        }
    }

    /// Rewrite `path` with `content`, creating parent directories as needed.
    ///
    /// Skips the write when the file already holds content with `expected_hash`.
    pub async fn write_content(
        &self,
        path: &Path,
        content: &[u8],
        expected_hash: Option<&str>,
    ) -> Result<RestoreOutcome, ActionError> {
        if let Some(expected) = expected_hash
            && let Ok(current) = fs::read(path).await
            && content_hash(&current) == expected
        {
            return Ok(RestoreOutcome::Unchanged);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ActionError::io("create parent of", parent, e))?;
        }
        fs::write(path, content)
            .await
            .map_err(|e| ActionError::io("write", path, e))?;
        Ok(RestoreOutcome::Rewritten)
    }

    /// Delete the whole backup tree of one operation; missing trees are fine
    pub async fn discard(&self, operation_id: &str) -> std::io::Result<()> {
        let dir = self.operation_dir(operation_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("[BACKUP] Discarded {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// In-memory content, falling back to the on-disk copy
    async fn load_content(&self, backup: &FileBackup) -> Result<Vec<u8>, ActionError> {
        match &backup.original_content {
            Some(content) => Ok(content.clone()),
            None => fs::read(&backup.backup_path)
                .await
                .map_err(|e| ActionError::io("read backup", &backup.backup_path, e)),
        }
    }
}

/// Remove a file that did not exist before the operation
pub async fn remove_if_present(path: &Path) -> Result<RestoreOutcome, ActionError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(RestoreOutcome::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(RestoreOutcome::AlreadyAbsent),
        Err(e) => Err(ActionError::io("remove", path, e)),
    }
}
