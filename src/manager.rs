// src/manager.rs
// Transaction manager - owns live rollback contexts and the backup root

use crate::action::{ActionType, RollbackData, RollbackHandler};
use crate::backup::{BackupStore, FileBackup};
use crate::config::RollbackConfig;
use crate::context::{ContextState, RollbackContext};
use crate::error::{Result, RollbackError};
use crate::utils::{normalize_path, validate_operation_id};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Priority given to file restores recorded by `backup_file`
pub const FILE_RESTORE_PRIORITY: i32 = 1;

/// Outcome of a rollback in which every action was undone
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub operation_id: String,
    pub succeeded: usize,
    pub failures: Vec<String>,
    pub duration_ms: u64,
}

/// Groups filesystem mutations into operations that can be committed or rolled back.
///
/// One instance owns its table of live contexts and its backup root; share it
/// between tasks with an `Arc`.
pub struct TransactionManager {
    config: RollbackConfig,
    store: BackupStore,
    contexts: RwLock<HashMap<String, RollbackContext>>,
}

impl TransactionManager {
    pub fn new(config: RollbackConfig) -> Self {
        let store = BackupStore::new(config.backup_root.clone(), config.working_dir.clone());
        Self {
            config,
            store,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Manager configured from the process cwd and environment
    pub fn from_env() -> std::io::Result<Self> {
        Ok(Self::new(RollbackConfig::from_env()?))
    }

    pub fn config(&self) -> &RollbackConfig {
        &self.config
    }

    pub fn backup_store(&self) -> &BackupStore {
        &self.store
    }

    /// Resolve a caller path against the working directory
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        normalize_path(path.as_ref(), &self.config.working_dir)
    }

    /// Register a fresh, active context for `operation_id`
    pub async fn start_context(
        &self,
        operation_id: &str,
        operation_name: &str,
    ) -> Result<RollbackContext> {
        validate_operation_id(operation_id).map_err(|reason| RollbackError::ContextStartFailed {
            operation_id: operation_id.to_string(),
            reason,
        })?;

        let mut contexts = self.contexts.write().await;
        if contexts.contains_key(operation_id) {
            return Err(RollbackError::ContextExists(operation_id.to_string()));
        }

        self.store
            .ensure_root()
            .await
            .map_err(|e| RollbackError::ContextStartFailed {
                operation_id: operation_id.to_string(),
                reason: format!(
                    "cannot create backup root {}: {}",
                    self.store.root().display(),
                    e
                ),
            })?;

        let context = RollbackContext::new(operation_id, operation_name);
        contexts.insert(operation_id.to_string(), context.clone());

        info!(
            operation_id = %operation_id,
            "[ROLLBACK] Started context '{}'",
            operation_name
        );
        Ok(context)
    }

    /// Append an undoable action; returns the new action's id
    pub async fn add_action(
        &self,
        operation_id: &str,
        action_type: ActionType,
        description: &str,
        data: RollbackData,
        priority: i32,
    ) -> Result<String> {
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(operation_id)
            .ok_or_else(|| RollbackError::ContextNotFound(operation_id.to_string()))?;

        let action = context.push_action(action_type, description, data, priority)?;
        debug!(
            operation_id = %operation_id,
            action_id = %action.id,
            action_type = %action.action_type,
            priority,
            "[ROLLBACK] Recorded action: {}",
            description
        );
        Ok(action.id.clone())
    }

    /// Record a caller-supplied undo step
    pub async fn add_custom_action(
        &self,
        operation_id: &str,
        description: &str,
        handler: Arc<dyn RollbackHandler>,
        priority: i32,
    ) -> Result<String> {
        self.add_action(
            operation_id,
            ActionType::Custom,
            description,
            RollbackData::Custom(handler),
            priority,
        )
        .await
    }

    /// Capture `file_path` before it is overwritten and record its restore.
    ///
    /// Backing up a path twice in one context returns the first backup unchanged.
    pub async fn backup_file(
        &self,
        operation_id: &str,
        file_path: impl AsRef<Path>,
    ) -> Result<FileBackup> {
        let path = self.resolve_path(file_path);
        let (backup, is_new) = self.capture(operation_id, &path).await?;
        if !is_new {
            return Ok(backup);
        }

        let (action_type, description) = if backup.existed {
            (
                ActionType::FileModify,
                format!("Restore {}", path.display()),
            )
        } else {
            (
                ActionType::FileCreate,
                format!("Remove created {}", path.display()),
            )
        };
        self.add_action(
            operation_id,
            action_type,
            &description,
            RollbackData::File(backup.clone()),
            FILE_RESTORE_PRIORITY,
        )
        .await?;

        Ok(backup)
    }

    /// Capture a file that is about to be deleted and record its recreation
    pub async fn record_file_delete(
        &self,
        operation_id: &str,
        file_path: impl AsRef<Path>,
    ) -> Result<FileBackup> {
        let path = self.resolve_path(file_path);
        let (backup, is_new) = self.capture(operation_id, &path).await?;
        if !is_new {
            return Ok(backup);
        }

        self.add_action(
            operation_id,
            ActionType::FileDelete,
            &format!("Recreate deleted {}", path.display()),
            RollbackData::File(backup.clone()),
            FILE_RESTORE_PRIORITY,
        )
        .await?;

        Ok(backup)
    }

    /// Record a directory the operation created, removed again on rollback
    pub async fn record_directory_create(
        &self,
        operation_id: &str,
        dir_path: impl AsRef<Path>,
    ) -> Result<String> {
        let path = self.resolve_path(dir_path);
        self.add_action(
            operation_id,
            ActionType::DirectoryCreate,
            &format!("Remove created directory {}", path.display()),
            RollbackData::Directory(path),
            0,
        )
        .await
    }

    /// Record a directory the operation deleted.
    ///
    /// Rollback recreates the directory empty; its former contents are not captured.
    pub async fn record_directory_delete(
        &self,
        operation_id: &str,
        dir_path: impl AsRef<Path>,
    ) -> Result<String> {
        let path = self.resolve_path(dir_path);
        self.add_action(
            operation_id,
            ActionType::DirectoryDelete,
            &format!("Recreate deleted directory {}", path.display()),
            RollbackData::Directory(path),
            0,
        )
        .await
    }

    /// Take or reuse the backup of an absolute path. Returns `(backup, newly_registered)`.
    async fn capture(&self, operation_id: &str, path: &Path) -> Result<(FileBackup, bool)> {
        {
            let contexts = self.contexts.read().await;
            let context = contexts
                .get(operation_id)
                .ok_or_else(|| RollbackError::ContextNotFound(operation_id.to_string()))?;
            context.ensure_active()?;

            if let Some(existing) = context.backup_for(path) {
                debug!(
                    operation_id = %operation_id,
                    "[BACKUP] {} already backed up, keeping first copy",
                    path.display()
                );
                return Ok((existing.clone(), false));
            }

            // No cross-operation locking; overlapping paths are only reported
            for (other_id, other) in contexts.iter() {
                if other_id != operation_id && other.is_active() && other.backup_for(path).is_some()
                {
                    warn!(
                        operation_id = %operation_id,
                        other_operation = %other_id,
                        "[BACKUP] {} is also backed up by another active operation",
                        path.display()
                    );
                }
            }
        }

        let backup = self
            .store
            .snapshot(operation_id, path)
            .await
            .map_err(|source| RollbackError::BackupFailed {
                path: path.to_path_buf(),
                source,
            })?;

        // Only the registering task may write the on-disk copy
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(operation_id)
            .ok_or_else(|| RollbackError::ContextNotFound(operation_id.to_string()))?;
        context.ensure_active()?;

        if let Some(existing) = context.backup_for(path) {
            // Another task registered this path while we were reading it
            return Ok((existing.clone(), false));
        }

        self.store
            .persist(&backup)
            .await
            .map_err(|source| RollbackError::BackupFailed {
                path: path.to_path_buf(),
                source,
            })?;
        context.insert_backup(backup.clone())?;
        Ok((backup, true))
    }

    /// Undo every recorded action of an operation, best effort.
    ///
    /// Actions run in priority order (highest first), most recent first within
    /// a priority. A failing action does not stop the others; all failures are
    /// returned together as `RollbackPartialFailure`.
    pub async fn execute_rollback(&self, operation_id: &str) -> Result<RollbackReport> {
        let started = Instant::now();

        let ordered = {
            let mut contexts = self.contexts.write().await;
            let context = contexts
                .get_mut(operation_id)
                .ok_or_else(|| RollbackError::ContextNotFound(operation_id.to_string()))?;

            if context.state() == ContextState::RollingBack {
                return Err(RollbackError::RollbackFailed {
                    operation_id: operation_id.to_string(),
                    reason: "rollback already in progress".to_string(),
                });
            }
            context.begin_rollback()?
        };

        info!(
            operation_id = %operation_id,
            actions = ordered.len(),
            "[ROLLBACK] Rolling back"
        );

        let mut succeeded = 0usize;
        let mut failures = Vec::new();

        for action in &ordered {
            let outcome = AssertUnwindSafe(action.undo(&self.store))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => {
                    warn!(
                        operation_id = %operation_id,
                        action_id = %action.id,
                        "[ROLLBACK] Failed to undo '{}': {}",
                        action.description,
                        e
                    );
                    failures.push(format!("{}: {}", action.description, e));
                }
                Err(_) => {
                    warn!(
                        operation_id = %operation_id,
                        action_id = %action.id,
                        "[ROLLBACK] Undo of '{}' panicked",
                        action.description
                    );
                    failures.push(format!("{}: undo panicked", action.description));
                }
            }
        }

        if let Err(e) = self.store.discard(operation_id).await {
            warn!(
                operation_id = %operation_id,
                "[ROLLBACK] Failed to clean up backups: {}",
                e
            );
        }

        if let Some(mut context) = self.contexts.write().await.remove(operation_id) {
            context.finish_rollback();
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        if failures.is_empty() {
            info!(
                operation_id = %operation_id,
                succeeded,
                duration_ms,
                "[ROLLBACK] Rolled back"
            );
            Ok(RollbackReport {
                operation_id: operation_id.to_string(),
                succeeded,
                failures,
                duration_ms,
            })
        } else {
            warn!(
                operation_id = %operation_id,
                succeeded,
                failed = failures.len(),
                "[ROLLBACK] Rollback completed with failures"
            );
            Err(RollbackError::RollbackPartialFailure {
                operation_id: operation_id.to_string(),
                failures,
                succeeded,
            })
        }
    }

    /// Discard an operation's backups and close it without restoring anything.
    ///
    /// A backup tree that cannot be removed is logged and left behind; the
    /// operation is committed regardless.
    pub async fn commit_context(&self, operation_id: &str) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get(operation_id)
            .ok_or_else(|| RollbackError::ContextNotFound(operation_id.to_string()))?;
        context.ensure_active()?;
        let action_count = context.actions().len();

        // Held across the discard so a restarted id cannot lose fresh backups
        if let Err(e) = self.store.discard(operation_id).await {
            warn!(
                operation_id = %operation_id,
                "[ROLLBACK] Failed to clean up backups after commit: {}",
                e
            );
        }

        if let Some(mut context) = contexts.remove(operation_id) {
            context.mark_committed();
        }

        info!(
            operation_id = %operation_id,
            actions = action_count,
            "[ROLLBACK] Committed"
        );
        Ok(())
    }

    /// Snapshot of one live context
    pub async fn get_context(&self, operation_id: &str) -> Option<RollbackContext> {
        self.contexts.read().await.get(operation_id).cloned()
    }

    /// Snapshot of every active context, oldest first
    pub async fn get_active_contexts(&self) -> Vec<RollbackContext> {
        let mut active: Vec<RollbackContext> = self
            .contexts
            .read()
            .await
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        active
    }

    /// Roll back every context that is still active.
    ///
    /// Meant for interrupt and fatal-error paths so no operation is left half-applied.
    pub async fn emergency_rollback_all(&self) -> Result<Vec<RollbackReport>> {
        let active = self.get_active_contexts().await;
        if active.is_empty() {
            return Ok(Vec::new());
        }

        warn!(
            contexts = active.len(),
            "[ROLLBACK] Emergency rollback of all active operations"
        );

        let mut reports = Vec::new();
        let mut failures = Vec::new();

        for context in active {
            let operation_id = context.operation_id;
            match self.execute_rollback(&operation_id).await {
                Ok(report) => reports.push(report),
                // Closed by another caller since the snapshot
                Err(RollbackError::ContextNotFound(_)) => {
                    debug!(operation_id = %operation_id, "[ROLLBACK] Already closed, skipping");
                }
                Err(e) => {
                    error!(
                        operation_id = %operation_id,
                        "[ROLLBACK] Emergency rollback failed: {}",
                        e
                    );
                    failures.push((operation_id, e.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(reports)
        } else {
            Err(RollbackError::EmergencyRollbackPartialFailure(failures))
        }
    }
}
