// src/action.rs
// Rollback actions - one undoable step each, dispatched on action type

use crate::backup::{BackupStore, FileBackup, RestoreOutcome, remove_if_present};
use crate::error::ActionError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use strum::{Display, EnumString, IntoStaticStr};
use tokio::fs;
use tracing::debug;

/// Kind of mutation an action undoes
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    FileCreate,
    FileModify,
    FileDelete,
    DirectoryCreate,
    DirectoryDelete,
    Custom,
}

/// Caller-supplied undo step for mutations that aren't file-backed
#[async_trait]
pub trait RollbackHandler: Send + Sync {
    async fn undo(&self) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a `RollbackHandler`
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RollbackHandler for FnHandler<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn undo(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

/// Wrap an async closure as a shareable undo handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RollbackHandler>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// What an action needs in order to be undone
#[derive(Clone)]
pub enum RollbackData {
    /// Restore (or remove) a file from its captured pre-image
    File(FileBackup),
    /// Remove or recreate a directory
    Directory(PathBuf),
    /// Run a caller-supplied undo
    Custom(Arc<dyn RollbackHandler>),
}

impl RollbackData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RollbackData::File(_) => "file",
            RollbackData::Directory(_) => "directory",
            RollbackData::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for RollbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackData::File(backup) => f.debug_tuple("File").field(backup).finish(),
            RollbackData::Directory(path) => f.debug_tuple("Directory").field(path).finish(),
            RollbackData::Custom(_) => f.write_str("Custom(<handler>)"),
        }
    }
}

/// One undoable step recorded in a rollback context.
///
/// Immutable once appended; ordering during rollback uses `priority`
/// (higher first), then `timestamp` and `sequence` (latest first).
#[derive(Debug, Clone)]
pub struct RollbackAction {
    pub id: String,
    pub action_type: ActionType,
    pub description: String,
    pub data: RollbackData,
    pub timestamp: DateTime<Utc>,
    pub priority: i32,
    /// Append position within the owning context
    pub sequence: u64,
}

impl RollbackAction {
    /// Undo this action against the filesystem
    pub async fn undo(&self, store: &BackupStore) -> Result<(), ActionError> {
        match (self.action_type, &self.data) {
            (ActionType::FileCreate, RollbackData::File(backup)) => {
                if backup.existed {
                    debug!(
                        "[ROLLBACK] {} existed before, nothing to remove",
                        backup.original_path.display()
                    );
                    return Ok(());
                }
                let outcome = remove_if_present(&backup.original_path).await?;
                self.log_outcome(outcome);
                Ok(())
            }
            (ActionType::FileModify, RollbackData::File(backup)) => {
                let outcome = store.restore(backup).await?;
                self.log_outcome(outcome);
                Ok(())
            }
            (ActionType::FileDelete, RollbackData::File(backup)) => {
                let Some(content) = &backup.original_content else {
                    debug!(
                        "[ROLLBACK] No captured content for {}, nothing to restore",
                        backup.original_path.display()
                    );
                    return Ok(());
                };
                let outcome = store
                    .write_content(
                        &backup.original_path,
                        content,
                        backup.content_hash.as_deref(),
                    )
                    .await?;
                self.log_outcome(outcome);
                Ok(())
            }
            (ActionType::DirectoryCreate, RollbackData::Directory(path)) => {
                match fs::remove_dir_all(path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(ActionError::io("remove directory", path, e)),
                }
            }
            (ActionType::DirectoryDelete, RollbackData::Directory(path)) => {
                // Only the directory itself comes back; its former contents are not captured
                fs::create_dir_all(path)
                    .await
                    .map_err(|e| ActionError::io("recreate directory", path, e))
            }
            (ActionType::Custom, RollbackData::Custom(handler)) => {
                handler.undo().await.map_err(ActionError::Custom)
            }
            (action_type, data) => Err(ActionError::UnknownActionType {
                action_type: action_type.to_string(),
                payload: data.kind_name(),
            }),
        }
    }

    fn log_outcome(&self, outcome: RestoreOutcome) {
        debug!(
            action_id = %self.id,
            ?outcome,
            "[ROLLBACK] Undid {}",
            self.description
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn action(action_type: ActionType, data: RollbackData) -> RollbackAction {
        RollbackAction {
            id: "op_0".to_string(),
            action_type,
            description: "test action".to_string(),
            data,
            timestamp: Utc::now(),
            priority: 0,
            sequence: 0,
        }
    }

    fn store_in(dir: &Path) -> BackupStore {
        BackupStore::new(dir.join(".rollback-backups"), dir.to_path_buf())
    }

    #[test]
    fn test_action_type_names() {
        assert_eq!(ActionType::FileCreate.to_string(), "file-create");
        assert_eq!(ActionType::DirectoryDelete.to_string(), "directory-delete");
        assert_eq!(
            ActionType::from_str("file-modify").unwrap(),
            ActionType::FileModify
        );
        assert!(ActionType::from_str("symlink-create").is_err());
    }

    #[test]
    fn test_action_type_serde() {
        let json = serde_json::to_string(&ActionType::FileDelete).unwrap();
        assert_eq!(json, "\"file-delete\"");
        let parsed: ActionType = serde_json::from_str("\"custom\"").unwrap();
        assert_eq!(parsed, ActionType::Custom);
    }

    #[tokio::test]
    async fn test_file_create_removes_new_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());
        let file = temp_dir.path().join("new.txt");

        let backup = store.capture("op", &file).await.unwrap();
        std::fs::write(&file, "hello").unwrap();

        action(ActionType::FileCreate, RollbackData::File(backup))
            .undo(&store)
            .await
            .unwrap();
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_file_create_keeps_preexisting_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());
        let file = temp_dir.path().join("old.txt");
        std::fs::write(&file, "old").unwrap();

        let backup = store.capture("op", &file).await.unwrap();
        action(ActionType::FileCreate, RollbackData::File(backup))
            .undo(&store)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_file_delete_recreates_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());
        let file = temp_dir.path().join("docs/readme.md");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "# Title").unwrap();

        let backup = store.capture("op", &file).await.unwrap();
        std::fs::remove_dir_all(temp_dir.path().join("docs")).unwrap();

        action(ActionType::FileDelete, RollbackData::File(backup))
            .undo(&store)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "# Title");
    }

    #[tokio::test]
    async fn test_file_delete_without_content_is_noop() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());
        let file = temp_dir.path().join("never.txt");

        let backup = store.capture("op", &file).await.unwrap();
        action(ActionType::FileDelete, RollbackData::File(backup))
            .undo(&store)
            .await
            .unwrap();
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_directory_create_removes_tree() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());
        let dir = temp_dir.path().join("generated");
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        std::fs::write(dir.join("inner/file.rs"), "x").unwrap();

        action(ActionType::DirectoryCreate, RollbackData::Directory(dir.clone()))
            .undo(&store)
            .await
            .unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_directory_delete_recreates_empty_dir() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());
        let dir = temp_dir.path().join("removed");

        action(ActionType::DirectoryDelete, RollbackData::Directory(dir.clone()))
            .undo(&store)
            .await
            .unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_custom_handler_runs() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let handler = handler_fn(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        });

        action(ActionType::Custom, RollbackData::Custom(handler))
            .undo(&store)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_handler_failure_propagates() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());
        let handler = handler_fn(|| async { Err::<(), _>(anyhow::anyhow!("process already exited")) });

        let err = action(ActionType::Custom, RollbackData::Custom(handler))
            .undo(&store)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Custom(_)));
        assert!(format!("{:#}", anyhow::Error::from(err)).contains("process already exited"));
    }

    #[tokio::test]
    async fn test_mismatched_payload_is_unknown_type() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let store = store_in(temp_dir.path());

        let err = action(
            ActionType::DirectoryCreate,
            RollbackData::Custom(handler_fn(|| async { Ok::<(), anyhow::Error>(()) })),
        )
        .undo(&store)
        .await
        .unwrap_err();
        assert!(matches!(err, ActionError::UnknownActionType { .. }));
        assert!(err.to_string().contains("directory-create"));
    }

    #[test]
    fn test_debug_hides_handler() {
        let data = RollbackData::Custom(handler_fn(|| async { Ok::<(), anyhow::Error>(()) }));
        assert_eq!(format!("{:?}", data), "Custom(<handler>)");
    }
}
