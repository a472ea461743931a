//! Queue fan-out: turns product-id lists into asynchronous chunks handed
//! to an at-least-once task executor.
//!
//! The executor may deliver a chunk more than once; consumers are
//! idempotent (re-flagging dirty and re-rebuilding a clean entry changes
//! nothing), so duplicates only cost wasted work.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument};
use uuid::Uuid;

use pelican_core::{ProductId, StoreId};

use crate::db::UpdateQueueRepository;
use crate::error::SyncError;
use crate::models::{QueueAction, UpdateQueueEntry};

/// Default number of product ids per dispatched chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// One unit of asynchronous work: a chunk of product ids for a store,
/// tagged with the batch that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub batch_id: Uuid,
    pub store_id: StoreId,
    pub action: QueueAction,
    pub product_ids: Vec<ProductId>,
}

/// Errors scheduling work with the task executor. Scheduling failure only;
/// execution outcomes are never reported back.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task executor unavailable: {0}")]
    Unavailable(String),
}

/// The at-least-once task execution collaborator.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Schedule a task. Success means accepted, not executed.
    async fn dispatch(&self, task: SyncTask) -> Result<(), DispatchError>;
}

/// In-process dispatcher backed by an unbounded channel; the worker binary
/// drains the receiving end.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<SyncTask>,
}

impl ChannelDispatcher {
    /// Create the dispatcher and its task stream.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TaskDispatcher for ChannelDispatcher {
    async fn dispatch(&self, task: SyncTask) -> Result<(), DispatchError> {
        self.tx
            .send(task)
            .map_err(|_| DispatchError::Unavailable("task channel closed".to_string()))
    }
}

/// Chunks product-id lists and hands them to the dispatcher.
pub struct QueuePublisher {
    dispatcher: Arc<dyn TaskDispatcher>,
    chunk_size: usize,
}

impl QueuePublisher {
    #[must_use]
    pub fn new(dispatcher: Arc<dyn TaskDispatcher>, chunk_size: usize) -> Self {
        Self {
            dispatcher,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Fan a product-id list out as chunks sharing one batch id.
    ///
    /// Returns the number of chunks dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the executor refuses a chunk.
    #[instrument(skip(self, product_ids), fields(store_id = %store_id, products = product_ids.len()))]
    pub async fn publish(
        &self,
        store_id: StoreId,
        action: QueueAction,
        product_ids: &[ProductId],
    ) -> Result<usize, DispatchError> {
        let batch_id = Uuid::new_v4();
        let mut chunks = 0_usize;

        for chunk in product_ids.chunks(self.chunk_size) {
            self.dispatcher
                .dispatch(SyncTask {
                    batch_id,
                    store_id,
                    action,
                    product_ids: chunk.to_vec(),
                })
                .await?;
            chunks += 1;
        }

        info!(%batch_id, chunks, "Published product batch");
        Ok(chunks)
    }
}

/// Drains the durable update queue into the publisher.
pub struct QueueProcessor {
    pool: SqlitePool,
    publisher: QueuePublisher,
}

impl QueueProcessor {
    #[must_use]
    pub const fn new(pool: SqlitePool, publisher: QueuePublisher) -> Self {
        Self { pool, publisher }
    }

    /// Append a batch to the durable queue (the request-path entry point).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Repository` if the insert fails.
    pub async fn enqueue(
        &self,
        store_id: StoreId,
        action: QueueAction,
        product_ids: &[ProductId],
    ) -> Result<UpdateQueueEntry, SyncError> {
        let repo = UpdateQueueRepository::new(&self.pool);
        Ok(repo.enqueue(store_id, action, product_ids).await?)
    }

    /// Claim every new queue entry for a store, merge same-action entries
    /// into deduplicated id sets, publish them, and mark the entries done.
    ///
    /// Returns the number of queue entries processed.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Repository` or `SyncError::Dispatch`.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn process(&self, store_id: StoreId) -> Result<usize, SyncError> {
        let repo = UpdateQueueRepository::new(&self.pool);
        let claimed = repo.claim_new(store_id).await?;
        if claimed.is_empty() {
            return Ok(0);
        }

        for action in [QueueAction::Upsert, QueueAction::Delete] {
            let merged: BTreeSet<ProductId> = claimed
                .iter()
                .filter(|entry| entry.action == action)
                .flat_map(|entry| entry.product_ids.iter().copied())
                .collect();
            if merged.is_empty() {
                continue;
            }
            let ids: Vec<ProductId> = merged.into_iter().collect();
            self.publisher.publish(store_id, action, &ids).await?;
        }

        let entry_ids: Vec<_> = claimed.iter().map(|entry| entry.id).collect();
        repo.mark_done(&entry_ids).await?;
        Ok(claimed.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_pool;
    use crate::models::QueueStatus;

    use super::*;

    #[tokio::test]
    async fn publish_chunks_share_a_batch_id() {
        let (dispatcher, mut rx) = ChannelDispatcher::channel();
        let publisher = QueuePublisher::new(Arc::new(dispatcher), 2);
        let ids: Vec<ProductId> = (1..=5).map(ProductId::new).collect();

        let chunks = publisher
            .publish(StoreId::new(1), QueueAction::Upsert, &ids)
            .await
            .unwrap();
        assert_eq!(chunks, 3);

        let mut tasks = Vec::new();
        while let Ok(task) = rx.try_recv() {
            tasks.push(task);
        }
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|task| task.batch_id == tasks[0].batch_id));
        assert_eq!(tasks[0].product_ids.len(), 2);
        assert_eq!(tasks[2].product_ids.len(), 1);
    }

    #[tokio::test]
    async fn process_merges_and_deduplicates_same_action_entries() {
        let pool = test_pool().await;
        let (dispatcher, mut rx) = ChannelDispatcher::channel();
        let processor = QueueProcessor::new(
            pool.clone(),
            QueuePublisher::new(Arc::new(dispatcher), DEFAULT_CHUNK_SIZE),
        );
        let store = StoreId::new(1);

        processor
            .enqueue(store, QueueAction::Upsert, &[ProductId::new(1), ProductId::new(2)])
            .await
            .unwrap();
        processor
            .enqueue(store, QueueAction::Upsert, &[ProductId::new(2), ProductId::new(3)])
            .await
            .unwrap();

        let processed = processor.process(store).await.unwrap();
        assert_eq!(processed, 2);

        let task = rx.try_recv().unwrap();
        assert_eq!(
            task.product_ids,
            vec![ProductId::new(1), ProductId::new(2), ProductId::new(3)]
        );
        assert!(rx.try_recv().is_err());

        // Entries are marked done; reprocessing finds nothing.
        assert_eq!(processor.process(store).await.unwrap(), 0);
        let repo = UpdateQueueRepository::new(&pool);
        let entry = repo
            .get_by_id(pelican_core::QueueEntryId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, QueueStatus::Done);
    }

    #[tokio::test]
    async fn closed_channel_surfaces_as_dispatch_error() {
        let (dispatcher, rx) = ChannelDispatcher::channel();
        drop(rx);
        let publisher = QueuePublisher::new(Arc::new(dispatcher), DEFAULT_CHUNK_SIZE);

        let err = publisher
            .publish(StoreId::new(1), QueueAction::Upsert, &[ProductId::new(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unavailable(_)));
    }
}
