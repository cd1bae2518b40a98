// src/context.rs
// Rollback context - one named operation with its action log and backup set

use crate::action::{ActionType, RollbackAction, RollbackData};
use crate::backup::FileBackup;
use crate::error::{Result, RollbackError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strum::Display;

/// Lifecycle of a rollback context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// Active, nothing recorded yet
    Created,
    /// Active, at least one action or backup recorded
    Recording,
    /// Rollback in progress; no longer accepts actions
    RollingBack,
    Committed,
    RolledBack,
}

impl ContextState {
    pub fn is_active(self) -> bool {
        matches!(self, ContextState::Created | ContextState::Recording)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ContextState::Committed | ContextState::RolledBack)
    }
}

/// Live record of one operation's recorded actions and backups
#[derive(Debug, Clone)]
pub struct RollbackContext {
    pub operation_id: String,
    pub operation_name: String,
    pub start_time: DateTime<Utc>,
    actions: Vec<RollbackAction>,
    backups: HashMap<PathBuf, FileBackup>,
    state: ContextState,
}

/// Serializable overview of a context for logs and introspection
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub operation_id: String,
    pub operation_name: String,
    pub start_time: DateTime<Utc>,
    pub state: ContextState,
    pub action_count: usize,
    pub backup_count: usize,
}

impl RollbackContext {
    pub fn new(operation_id: impl Into<String>, operation_name: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            operation_name: operation_name.into(),
            start_time: Utc::now(),
            actions: Vec::new(),
            backups: HashMap::new(),
            state: ContextState::Created,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Actions in append (chronological) order
    pub fn actions(&self) -> &[RollbackAction] {
        &self.actions
    }

    pub fn backups(&self) -> &HashMap<PathBuf, FileBackup> {
        &self.backups
    }

    pub fn backup_for(&self, path: &Path) -> Option<&FileBackup> {
        self.backups.get(path)
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            operation_id: self.operation_id.clone(),
            operation_name: self.operation_name.clone(),
            start_time: self.start_time,
            state: self.state,
            action_count: self.actions.len(),
            backup_count: self.backups.len(),
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(RollbackError::ContextInactive(self.operation_id.clone()))
        }
    }

    /// Append an action stamped with the current time
    pub(crate) fn push_action(
        &mut self,
        action_type: ActionType,
        description: impl Into<String>,
        data: RollbackData,
        priority: i32,
    ) -> Result<&RollbackAction> {
        self.ensure_active()?;

        let sequence = self.actions.len() as u64;
        self.actions.push(RollbackAction {
            id: format!("{}_{}", self.operation_id, sequence),
            action_type,
            description: description.into(),
            data,
            timestamp: Utc::now(),
            priority,
            sequence,
        });
        self.state = ContextState::Recording;

        Ok(&self.actions[self.actions.len() - 1])
    }

    /// Register a backup; the first backup for a path wins
    pub(crate) fn insert_backup(&mut self, backup: FileBackup) -> Result<bool> {
        self.ensure_active()?;
        if self.backups.contains_key(&backup.original_path) {
            return Ok(false);
        }
        self.backups.insert(backup.original_path.clone(), backup);
        self.state = ContextState::Recording;
        Ok(true)
    }

    /// Stop accepting actions and return the undo sequence
    pub(crate) fn begin_rollback(&mut self) -> Result<Vec<RollbackAction>> {
        self.ensure_active()?;
        self.state = ContextState::RollingBack;
        Ok(rollback_order(&self.actions))
    }

    pub(crate) fn finish_rollback(&mut self) {
        self.state = ContextState::RolledBack;
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = ContextState::Committed;
    }
}

/// Order actions for undo: priority descending, then most recent first.
///
/// Ties on timestamp fall back to append order so the later append is undone first.
pub fn rollback_order(actions: &[RollbackAction]) -> Vec<RollbackAction> {
    let mut ordered = actions.to_vec();
    ordered.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| b.sequence.cmp(&a.sequence))
    });
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_data(name: &str) -> RollbackData {
        RollbackData::Directory(PathBuf::from(name))
    }

    fn backup(path: &str, content: &str) -> FileBackup {
        FileBackup {
            original_path: PathBuf::from(path),
            backup_path: PathBuf::from(format!("/bak{}", path)),
            original_content: Some(content.as_bytes().to_vec()),
            existed: true,
            content_hash: None,
        }
    }

    #[test]
    fn test_new_context_is_created_and_active() {
        let ctx = RollbackContext::new("op1", "create-file");
        assert_eq!(ctx.state(), ContextState::Created);
        assert!(ctx.is_active());
        assert!(ctx.actions().is_empty());
        assert!(ctx.backups().is_empty());
    }

    #[test]
    fn test_push_action_assigns_ids_and_records() {
        let mut ctx = RollbackContext::new("op1", "mkdir");
        ctx.push_action(ActionType::DirectoryCreate, "create a", dir_data("a"), 0)
            .unwrap();
        let second = ctx
            .push_action(ActionType::DirectoryCreate, "create b", dir_data("b"), 0)
            .unwrap();
        assert_eq!(second.id, "op1_1");
        assert_eq!(second.sequence, 1);
        assert_eq!(ctx.state(), ContextState::Recording);
        assert_eq!(ctx.actions()[0].id, "op1_0");
    }

    #[test]
    fn test_first_backup_wins() {
        let mut ctx = RollbackContext::new("op1", "edit");
        assert!(ctx.insert_backup(backup("/w/a.txt", "first")).unwrap());
        assert!(!ctx.insert_backup(backup("/w/a.txt", "second")).unwrap());

        let kept = ctx.backup_for(Path::new("/w/a.txt")).unwrap();
        assert_eq!(kept.original_content.as_deref(), Some(&b"first"[..]));
    }

    #[test]
    fn test_inactive_context_rejects_actions() {
        let mut ctx = RollbackContext::new("op1", "edit");
        ctx.mark_committed();

        let err = ctx
            .push_action(ActionType::DirectoryCreate, "late", dir_data("x"), 0)
            .unwrap_err();
        assert!(matches!(err, RollbackError::ContextInactive(_)));

        let err = ctx.insert_backup(backup("/w/a.txt", "x")).unwrap_err();
        assert!(matches!(err, RollbackError::ContextInactive(_)));
    }

    #[test]
    fn test_begin_rollback_closes_context() {
        let mut ctx = RollbackContext::new("op1", "edit");
        ctx.push_action(ActionType::DirectoryCreate, "a", dir_data("a"), 0)
            .unwrap();
        let ordered = ctx.begin_rollback().unwrap();
        assert_eq!(ordered.len(), 1);
        assert_eq!(ctx.state(), ContextState::RollingBack);
        assert!(!ctx.is_active());
        assert!(!ctx.state().is_terminal());

        // A second rollback is refused
        assert!(matches!(
            ctx.begin_rollback(),
            Err(RollbackError::ContextInactive(_))
        ));

        ctx.finish_rollback();
        assert!(ctx.state().is_terminal());
    }

    #[test]
    fn test_rollback_order_priority_then_recency() {
        let mut ctx = RollbackContext::new("op1", "mixed");
        ctx.push_action(ActionType::DirectoryCreate, "low-old", dir_data("1"), 1)
            .unwrap();
        ctx.push_action(ActionType::DirectoryCreate, "high", dir_data("2"), 5)
            .unwrap();
        ctx.push_action(ActionType::DirectoryCreate, "low-new", dir_data("3"), 1)
            .unwrap();
        ctx.push_action(ActionType::DirectoryCreate, "zero", dir_data("4"), 0)
            .unwrap();

        let order: Vec<_> = rollback_order(ctx.actions())
            .into_iter()
            .map(|a| a.description)
            .collect();
        assert_eq!(order, vec!["high", "low-new", "low-old", "zero"]);
    }

    #[test]
    fn test_rollback_order_uses_timestamp_before_sequence() {
        let mut ctx = RollbackContext::new("op1", "clock");
        ctx.push_action(ActionType::DirectoryCreate, "a", dir_data("a"), 0)
            .unwrap();
        ctx.push_action(ActionType::DirectoryCreate, "b", dir_data("b"), 0)
            .unwrap();

        let mut actions = ctx.actions().to_vec();
        actions[0].timestamp = actions[1].timestamp + chrono::Duration::seconds(1);

        let order: Vec<_> = rollback_order(&actions)
            .into_iter()
            .map(|a| a.description)
            .collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_summary_serializes() {
        let mut ctx = RollbackContext::new("op1", "edit");
        ctx.insert_backup(backup("/w/a.txt", "x")).unwrap();
        let json = serde_json::to_value(ctx.summary()).unwrap();
        assert_eq!(json["operation_id"], "op1");
        assert_eq!(json["state"], "recording");
        assert_eq!(json["backup_count"], 1);
        assert_eq!(json["action_count"], 0);
    }
}
