//! Task consumer: drains dispatched [`SyncTask`] chunks into the
//! invalidation -> rebuild -> sync path.
//!
//! Tasks arrive at least once; every step is idempotent, so a duplicate
//! delivery re-derives the same state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::error::SyncError;
use crate::models::QueueAction;
use crate::services::{InvalidationService, RebuildService, SyncService, SyncTask};

/// Consumes dispatched sync tasks.
pub struct TaskConsumer {
    invalidation: Arc<InvalidationService>,
    rebuild: Arc<RebuildService>,
    sync: Arc<SyncService>,
}

impl TaskConsumer {
    #[must_use]
    pub fn new(
        invalidation: Arc<InvalidationService>,
        rebuild: Arc<RebuildService>,
        sync: Arc<SyncService>,
    ) -> Self {
        Self {
            invalidation,
            rebuild,
            sync,
        }
    }

    /// Drain the task stream until the sending side closes.
    pub async fn run(&self, mut tasks: mpsc::UnboundedReceiver<SyncTask>) {
        info!("Task consumer started");
        while let Some(task) = tasks.recv().await {
            if let Err(err) = self.handle(task).await {
                sentry::capture_error(&err);
                error!(error = %err, "Task failed");
            }
        }
        info!("Task consumer stopped");
    }

    /// Run one task to completion.
    ///
    /// # Errors
    ///
    /// Propagates fatal errors and structural failures; the caller logs
    /// them and moves on to the next task.
    #[instrument(skip(self, task), fields(batch_id = %task.batch_id, store_id = %task.store_id, action = ?task.action))]
    pub async fn handle(&self, task: SyncTask) -> Result<(), SyncError> {
        debug!(products = task.product_ids.len(), "Handling sync task");

        match task.action {
            QueueAction::Upsert => {
                // Rebuild what was actually flagged: redirection may have
                // landed on composite parents outside the task's id list.
                let targets = self
                    .invalidation
                    .invalidate_or_create(&task.product_ids, task.store_id)
                    .await?;
                self.rebuild
                    .rebuild_dirty_products(task.store_id, Some(&targets))
                    .await?;
                match self.sync.sync_indexed_products(task.store_id).await {
                    Ok(_) => Ok(()),
                    // A store without an account still indexes locally; the
                    // push happens once an account is linked.
                    Err(SyncError::AccountNotFound(store_id)) => {
                        debug!(%store_id, "No account linked, sync deferred");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            QueueAction::Delete => {
                self.invalidation
                    .mark_deleted_by_diff(&[], &task.product_ids, task.store_id)
                    .await?;
                match self.sync.purge_deleted_products(task.store_id).await {
                    Ok(_) => Ok(()),
                    Err(SyncError::AccountNotFound(store_id)) => {
                        debug!(%store_id, "No account linked, purge deferred");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}
