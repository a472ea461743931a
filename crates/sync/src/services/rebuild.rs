//! Rebuild service: turns dirty index entries back into trusted snapshots.
//!
//! A rebuild always clears `is_dirty`; it only clears `in_sync` when the
//! freshly built snapshot structurally differs from the stored one, so an
//! unchanged product never triggers a redundant upstream push.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use pelican_core::{ProductId, StoreId};

use crate::builder::{BuildError, SnapshotBuilder};
use crate::catalog::CatalogStore;
use crate::db::IndexEntryRepository;
use crate::error::SyncError;
use crate::instrument::{Benchmark, MemoryGuard};
use crate::models::{IndexEntry, SnapshotEnvelope};

/// Default number of dirty entries loaded per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Items between benchmark checkpoints.
const BENCHMARK_BREAKPOINT: usize = 10;

/// Rebuilds dirty index entries from live catalog state.
pub struct RebuildService {
    pool: SqlitePool,
    catalog: Arc<dyn CatalogStore>,
    builder: Arc<SnapshotBuilder>,
    memory_guard: MemoryGuard,
    page_size: usize,
}

impl RebuildService {
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        catalog: Arc<dyn CatalogStore>,
        builder: Arc<SnapshotBuilder>,
        memory_guard: MemoryGuard,
        page_size: usize,
    ) -> Self {
        Self {
            pool,
            catalog,
            builder,
            memory_guard,
            page_size: page_size.max(1),
        }
    }

    /// Rebuild a single dirty entry.
    ///
    /// Returns the persisted entry, or `None` (logged, never raised) when
    /// anything about this one product fails; a bad product must not halt a
    /// batch. A product that no longer loads or no longer qualifies flags
    /// the entry deleted instead.
    pub async fn rebuild_dirty_product(&self, entry: IndexEntry) -> Option<IndexEntry> {
        let product_id = entry.product_id;
        let store_id = entry.store_id;
        match self.try_rebuild(entry).await {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(%product_id, %store_id, error = %err, "Rebuild failed for product");
                None
            }
        }
    }

    async fn try_rebuild(&self, mut entry: IndexEntry) -> Result<IndexEntry, SyncError> {
        let repo = IndexEntryRepository::new(&self.pool);

        let Some(store) = self.catalog.store(entry.store_id).await? else {
            // Store scope vanished; nothing to build against.
            entry.is_deleted = true;
            entry.is_dirty = false;
            repo.save(&entry).await?;
            return Ok(entry);
        };

        let Some(product) = self.catalog.product(entry.product_id, entry.store_id).await? else {
            info!(product_id = %entry.product_id, store_id = %entry.store_id,
                "Product no longer exists, flagging entry deleted");
            entry.is_deleted = true;
            entry.is_dirty = false;
            repo.save(&entry).await?;
            return Ok(entry);
        };

        match self.builder.build(&product, &store).await {
            Ok(snapshot) => {
                // A stored blob that fails to decode counts as "differs";
                // it forces a resync rather than an error.
                let differs = entry
                    .snapshot()
                    .is_none_or(|stored| !stored.structurally_equals(&snapshot));

                if differs {
                    entry.product_data =
                        Some(SnapshotEnvelope::new(snapshot).encode().map_err(|e| {
                            crate::db::RepositoryError::DataCorruption(format!(
                                "snapshot encode: {e}"
                            ))
                        })?);
                    entry.in_sync = false;
                }
                entry.is_dirty = false;
                repo.save(&entry).await?;
                Ok(entry)
            }
            Err(err @ (BuildError::Filtered(_) | BuildError::NonBuildable(_))) => {
                info!(product_id = %entry.product_id, store_id = %entry.store_id,
                    reason = %err, "Product no longer qualifies, flagging entry deleted");
                entry.is_deleted = true;
                entry.is_dirty = false;
                repo.save(&entry).await?;
                Ok(entry)
            }
            Err(BuildError::ParentCategoryDisabled(category)) => {
                // The builder normally absorbs this per category; reaching
                // here means the walk failed wholesale.
                Err(SyncError::Catalog(crate::catalog::CatalogError::Backend(
                    format!("category {category} is disabled"),
                )))
            }
            Err(BuildError::Catalog(err)) => Err(err.into()),
        }
    }

    /// Rebuild every dirty entry for a store, optionally restricted to a
    /// product id list (used by queue tasks to scope a sweep to a batch).
    ///
    /// Returns the number of entries rebuilt.
    ///
    /// # Errors
    ///
    /// Only the memory guard and repository scans propagate; per-entry
    /// failures are logged and skipped.
    #[instrument(skip(self, product_ids), fields(store_id = %store_id))]
    pub async fn rebuild_dirty_products(
        &self,
        store_id: StoreId,
        product_ids: Option<&[ProductId]>,
    ) -> Result<usize, SyncError> {
        let repo = IndexEntryRepository::new(&self.pool);
        let mut bench = Benchmark::new("rebuild", BENCHMARK_BREAKPOINT);
        let mut rebuilt = 0_usize;
        // Entries that fail stay dirty; advance past them so the scan
        // cannot loop forever on a persistently failing product.
        let mut failed_offset: i64 = 0;

        loop {
            self.memory_guard.check()?;

            let page = repo
                .list_dirty(
                    store_id,
                    product_ids,
                    i64::try_from(self.page_size).unwrap_or(i64::MAX),
                    failed_offset,
                )
                .await?;
            if page.is_empty() {
                break;
            }

            for entry in page {
                match self.rebuild_dirty_product(entry).await {
                    Some(_) => rebuilt += 1,
                    None => failed_offset += 1,
                }
                bench.tick();
            }
        }

        let summary = bench.finish();
        info!(rebuilt, failed = summary.count - rebuilt, "Rebuild sweep finished");
        Ok(rebuilt)
    }
}
