// src/error.rs
// Error types for the rollback subsystem

use std::path::PathBuf;
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Stable error kinds surfaced at process boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ContextExists,
    ContextNotFound,
    ContextInactive,
    ContextStartFailed,
    BackupFailed,
    RollbackFailed,
    RollbackPartialFailure,
    CommitFailed,
    EmergencyRollbackPartialFailure,
}

/// Main error type for transaction manager operations
#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("rollback context already exists: {0}")]
    ContextExists(String),

    #[error("rollback context not found: {0}")]
    ContextNotFound(String),

    #[error("rollback context is not active: {0}")]
    ContextInactive(String),

    #[error("failed to start rollback context {operation_id}: {reason}")]
    ContextStartFailed { operation_id: String, reason: String },

    #[error("failed to back up {path}: {source}")]
    BackupFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("rollback failed for {operation_id}: {reason}")]
    RollbackFailed { operation_id: String, reason: String },

    #[error(
        "rollback of {} partially failed ({} succeeded, {} failed): {}",
        .operation_id,
        .succeeded,
        .failures.len(),
        .failures.join("; ")
    )]
    RollbackPartialFailure {
        operation_id: String,
        failures: Vec<String>,
        succeeded: usize,
    },

    #[error("failed to commit {operation_id}: {source}")]
    CommitFailed {
        operation_id: String,
        source: std::io::Error,
    },

    #[error("emergency rollback partially failed: {}", format_pairs(.0))]
    EmergencyRollbackPartialFailure(Vec<(String, String)>),
}

/// Convenience type alias for Result using RollbackError
pub type Result<T> = std::result::Result<T, RollbackError>;

impl RollbackError {
    /// The stable kind of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            RollbackError::ContextExists(_) => ErrorCode::ContextExists,
            RollbackError::ContextNotFound(_) => ErrorCode::ContextNotFound,
            RollbackError::ContextInactive(_) => ErrorCode::ContextInactive,
            RollbackError::ContextStartFailed { .. } => ErrorCode::ContextStartFailed,
            RollbackError::BackupFailed { .. } => ErrorCode::BackupFailed,
            RollbackError::RollbackFailed { .. } => ErrorCode::RollbackFailed,
            RollbackError::RollbackPartialFailure { .. } => ErrorCode::RollbackPartialFailure,
            RollbackError::CommitFailed { .. } => ErrorCode::CommitFailed,
            RollbackError::EmergencyRollbackPartialFailure(_) => {
                ErrorCode::EmergencyRollbackPartialFailure
            }
        }
    }

    /// Convert to user-facing string for process boundaries
    pub fn to_user_string(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }
}

fn format_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(id, msg)| format!("{}: {}", id, msg))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a single rollback action.
///
/// These never escape the rollback loop directly; they are logged and
/// folded into `RollbackError::RollbackPartialFailure`.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unknown action type {action_type} for {payload} payload")]
    UnknownActionType {
        action_type: String,
        payload: &'static str,
    },

    #[error("custom undo failed: {0}")]
    Custom(#[source] anyhow::Error),
}

impl ActionError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ActionError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
