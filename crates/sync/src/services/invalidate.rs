//! Invalidation service: reacts to catalog mutations by flagging index
//! entries dirty.
//!
//! Child/variant changes redirect to their composite parents: the parent's
//! entry is what gets flagged, and children of an indexed parent never get
//! entries of their own.

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, instrument, warn};

use pelican_core::{ProductId, StoreId};

use crate::catalog::CatalogStore;
use crate::db::{IndexEntryRepository, RepositoryError};
use crate::error::SyncError;

/// Default number of products handled per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Flags index entries dirty in response to catalog changes.
pub struct InvalidationService {
    pool: SqlitePool,
    catalog: Arc<dyn CatalogStore>,
    page_size: usize,
}

impl InvalidationService {
    #[must_use]
    pub fn new(pool: SqlitePool, catalog: Arc<dyn CatalogStore>, page_size: usize) -> Self {
        Self {
            pool,
            catalog,
            page_size: page_size.max(1),
        }
    }

    /// Mark-or-create a dirty index entry for every product in the list,
    /// redirecting children to their composite parents.
    ///
    /// Per-product repository failures are logged and skipped; one bad row
    /// never aborts the batch. Parent resolution failures are structural
    /// (configuration or data, not transient) and abort the whole call.
    ///
    /// Returns the flagged target ids (parents where redirection applied),
    /// so callers can scope follow-up rebuilds to what actually changed.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Catalog` when parent resolution fails.
    #[instrument(skip(self, product_ids), fields(store_id = %store_id, products = product_ids.len()))]
    pub async fn invalidate_or_create(
        &self,
        product_ids: &[ProductId],
        store_id: StoreId,
    ) -> Result<Vec<ProductId>, SyncError> {
        let repo = IndexEntryRepository::new(&self.pool);
        // Guards against flagging the same parent once per changed child
        // within this invocation.
        let mut seen: HashSet<ProductId> = HashSet::new();
        let mut flagged: Vec<ProductId> = Vec::new();
        let mut failures: Vec<(ProductId, RepositoryError)> = Vec::new();

        for page in product_ids.chunks(self.page_size) {
            for &product_id in page {
                let parents = self.catalog.parent_ids(product_id).await?;
                let targets: Vec<ProductId> = if parents.is_empty() {
                    vec![product_id]
                } else {
                    parents
                };

                for target in targets {
                    if !seen.insert(target) {
                        continue;
                    }
                    match repo.mark_dirty_or_create(target, store_id).await {
                        Ok(()) => flagged.push(target),
                        Err(err) => failures.push((target, err)),
                    }
                }
            }
        }

        for (product_id, err) in &failures {
            warn!(%product_id, %store_id, error = %err, "Failed to flag index entry dirty");
        }
        debug!(
            flagged = flagged.len(),
            failed = failures.len(),
            "Invalidation pass finished"
        );

        Ok(flagged)
    }

    /// Reconciliation pass: soft-delete entries for ids that are known to
    /// the index but absent from a fresh catalog load.
    ///
    /// Returns the number of entries flagged deleted.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Repository` if the flag update fails.
    #[instrument(skip(self, present_ids, known_ids), fields(store_id = %store_id))]
    pub async fn mark_deleted_by_diff(
        &self,
        present_ids: &[ProductId],
        known_ids: &[ProductId],
        store_id: StoreId,
    ) -> Result<u64, SyncError> {
        let present: HashSet<ProductId> = present_ids.iter().copied().collect();
        let missing: Vec<ProductId> = known_ids
            .iter()
            .copied()
            .filter(|id| !present.contains(id))
            .collect();

        if missing.is_empty() {
            return Ok(0);
        }

        let repo = IndexEntryRepository::new(&self.pool);
        let flagged = repo.mark_deleted(&missing, store_id).await?;
        debug!(flagged, "Flagged removed products as deleted");
        Ok(flagged)
    }
}
