// src/lib.rs
// fs-rollback - transactional file-mutation rollback

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod action;
pub mod backup;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod manager;
pub mod utils;

pub use action::{ActionType, FnHandler, RollbackAction, RollbackData, RollbackHandler, handler_fn};
pub use backup::{BackupStore, FileBackup, RestoreOutcome};
pub use config::RollbackConfig;
pub use context::{ContextState, ContextSummary, RollbackContext};
pub use error::{ActionError, ErrorCode, Result, RollbackError};
pub use guard::{spawn_interrupt_guard, spawn_rollback_on, with_transaction};
pub use manager::{RollbackReport, TransactionManager};
