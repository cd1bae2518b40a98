// src/guard.rs
// Caller-side helpers: scoped transactions and the interrupt safety hook

use crate::error::RollbackError;
use crate::manager::TransactionManager;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Run `f` inside a fresh context: commit on `Ok`, roll back on `Err`.
///
/// The closure's own error is returned after rollback; rollback failures
/// are logged rather than replacing it.
pub async fn with_transaction<F, Fut, T, E>(
    manager: &TransactionManager,
    operation_id: &str,
    operation_name: &str,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<RollbackError>,
{
    manager.start_context(operation_id, operation_name).await?;

    match f().await {
        Ok(value) => {
            manager.commit_context(operation_id).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = manager.execute_rollback(operation_id).await {
                warn!(
                    operation_id = %operation_id,
                    "[ROLLBACK] Rollback after failed operation was incomplete: {}",
                    rollback_err
                );
            }
            Err(e)
        }
    }
}

/// Roll back every active operation once `signal` resolves
pub fn spawn_rollback_on<S>(manager: Arc<TransactionManager>, signal: S) -> JoinHandle<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;

        let active = manager.get_active_contexts().await.len();
        if active == 0 {
            return;
        }

        warn!(contexts = active, "[ROLLBACK] Shutdown signal with active operations");
        match manager.emergency_rollback_all().await {
            Ok(reports) => info!(
                rolled_back = reports.len(),
                "[ROLLBACK] Emergency rollback complete"
            ),
            Err(e) => error!("[ROLLBACK] {}", e),
        }
    })
}

/// Install the process-level safety hook: Ctrl-C rolls back all active operations
pub fn spawn_interrupt_guard(manager: Arc<TransactionManager>) -> JoinHandle<()> {
    spawn_rollback_on(manager, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Without a signal listener the guard can never fire; stay parked
            error!("[ROLLBACK] Failed to listen for interrupt: {}", e);
            futures::future::pending::<()>().await;
        }
    })
}
