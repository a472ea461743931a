//! Sync/publish service: pushes out-of-sync snapshots to the
//! recommendation API and purges soft-deleted entries.
//!
//! Delivery is fire-and-mark: a batch is flagged in-sync whether or not the
//! API call succeeded. Retrying here would loop forever on a permanently
//! rejected item; a future catalog change re-flags the entry dirty and the
//! cycle repeats with fresh data.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use pelican_core::{IndexEntryId, ProductId, StoreId};

use crate::api::{AccountCredentials, AccountStore, RecommendationApi};
use crate::db::IndexEntryRepository;
use crate::error::SyncError;
use crate::instrument::MemoryGuard;
use crate::models::{IndexEntry, ProductSnapshot};

/// Default upsert batch size; matches the API's practical batch limit.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Pushes index entries upstream and purges deletions.
pub struct SyncService {
    pool: SqlitePool,
    api: Arc<dyn RecommendationApi>,
    accounts: Arc<dyn AccountStore>,
    memory_guard: MemoryGuard,
    batch_size: usize,
}

impl SyncService {
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        api: Arc<dyn RecommendationApi>,
        accounts: Arc<dyn AccountStore>,
        memory_guard: MemoryGuard,
        batch_size: usize,
    ) -> Self {
        Self {
            pool,
            api,
            accounts,
            memory_guard,
            batch_size: batch_size.max(1),
        }
    }

    /// Push every out-of-sync entry for the store, then purge deletions.
    ///
    /// Returns the number of entries marked in-sync.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AccountNotFound`] when no account is linked to the
    ///   store; nothing is synced.
    /// - [`SyncError::MemoryOutOfBounds`] from the memory guard.
    ///
    /// API failures are logged, never raised.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn sync_indexed_products(&self, store_id: StoreId) -> Result<usize, SyncError> {
        let account = self
            .accounts
            .account_for_store(store_id)
            .await
            .ok_or(SyncError::AccountNotFound(store_id))?;

        let repo = IndexEntryRepository::new(&self.pool);
        let batch_size = i64::try_from(self.batch_size).unwrap_or(i64::MAX);
        let mut marked = 0_usize;

        loop {
            self.memory_guard.check()?;

            let batch = repo.list_out_of_sync(store_id, None, batch_size, 0).await?;
            if batch.is_empty() {
                break;
            }

            // Entries without a decodable snapshot (never built, or stale
            // format) have nothing to push but are still marked: the next
            // rebuild re-flags them if they matter.
            let snapshots: Vec<ProductSnapshot> =
                batch.iter().filter_map(IndexEntry::snapshot).collect();
            if !snapshots.is_empty()
                && let Err(err) = self.api.upsert(&account, &snapshots).await
            {
                warn!(%store_id, batch = snapshots.len(), error = %err,
                    "Upsert batch failed, marking in-sync anyway");
            }

            let entry_ids: Vec<IndexEntryId> = batch.iter().map(|entry| entry.id).collect();
            repo.mark_in_sync(store_id, &entry_ids).await?;
            marked += entry_ids.len();
        }

        info!(marked, "Sync pass finished");
        self.purge_with_account(store_id, &account).await?;
        Ok(marked)
    }

    /// Purge soft-deleted entries for a store: send the delete operation,
    /// then physically remove the rows.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::sync_indexed_products`].
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn purge_deleted_products(&self, store_id: StoreId) -> Result<usize, SyncError> {
        let account = self
            .accounts
            .account_for_store(store_id)
            .await
            .ok_or(SyncError::AccountNotFound(store_id))?;
        self.purge_with_account(store_id, &account).await
    }

    async fn purge_with_account(
        &self,
        store_id: StoreId,
        account: &AccountCredentials,
    ) -> Result<usize, SyncError> {
        let repo = IndexEntryRepository::new(&self.pool);
        let batch_size = i64::try_from(self.batch_size).unwrap_or(i64::MAX);
        let mut purged = 0_usize;

        loop {
            self.memory_guard.check()?;

            let batch = repo.list_deleted(store_id, None, batch_size, 0).await?;
            if batch.is_empty() {
                break;
            }

            let product_ids: Vec<ProductId> =
                batch.iter().map(|entry| entry.product_id).collect();
            if let Err(err) = self.api.delete(account, &product_ids).await {
                warn!(%store_id, batch = product_ids.len(), error = %err,
                    "Delete batch failed, purging rows anyway");
            }

            let entry_ids: Vec<IndexEntryId> = batch.iter().map(|entry| entry.id).collect();
            purged += usize::try_from(repo.delete_rows(&entry_ids).await?).unwrap_or(0);
        }

        if purged > 0 {
            info!(purged, "Purged deleted entries");
        }
        Ok(purged)
    }
}
