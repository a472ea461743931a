//! Periodic sweeps: the cron-style safety net behind the event-driven path.
//!
//! Each pass walks every store that has a linked account and (1) drains the
//! durable update queue, (2) invalidates products with an active pricing
//! schedule, (3) rebuilds dirty entries, (4) syncs out-of-sync entries.
//! A missed or duplicated event-path update is corrected here on the next
//! pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument};

use crate::api::AccountStore;
use crate::catalog::CatalogStore;
use crate::error::SyncError;
use crate::services::{InvalidationService, QueueProcessor, RebuildService, SyncService};

/// Runs the periodic safety-net passes.
pub struct Sweeper {
    catalog: Arc<dyn CatalogStore>,
    accounts: Arc<dyn AccountStore>,
    invalidation: Arc<InvalidationService>,
    rebuild: Arc<RebuildService>,
    sync: Arc<SyncService>,
    queue: Arc<QueueProcessor>,
}

impl Sweeper {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        accounts: Arc<dyn AccountStore>,
        invalidation: Arc<InvalidationService>,
        rebuild: Arc<RebuildService>,
        sync: Arc<SyncService>,
        queue: Arc<QueueProcessor>,
    ) -> Self {
        Self {
            catalog,
            accounts,
            invalidation,
            rebuild,
            sync,
            queue,
        }
    }

    /// One full pass over every store with an account.
    ///
    /// Per-store failures are logged and the pass continues with the next
    /// store; only a fatal error (the memory guard) aborts the pass.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that aborted the pass.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<(), SyncError> {
        let stores = self.catalog.stores().await?;

        for store in stores {
            if self.accounts.account_for_store(store.id).await.is_none() {
                debug!(store_id = %store.id, "No account linked, skipping store");
                continue;
            }

            if let Err(err) = self.queue.process(store.id).await {
                if err.is_fatal() {
                    return Err(err);
                }
                error!(store_id = %store.id, error = %err, "Queue pass failed");
            }

            match self
                .catalog
                .scheduled_price_product_ids(store.id, Utc::now())
                .await
            {
                Ok(scheduled) if !scheduled.is_empty() => {
                    if let Err(err) = self
                        .invalidation
                        .invalidate_or_create(&scheduled, store.id)
                        .await
                    {
                        if err.is_fatal() {
                            return Err(err);
                        }
                        error!(store_id = %store.id, error = %err,
                            "Scheduled-price invalidation failed");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    error!(store_id = %store.id, error = %err,
                        "Scheduled-price lookup failed");
                }
            }

            if let Err(err) = self.rebuild.rebuild_dirty_products(store.id, None).await {
                if err.is_fatal() {
                    return Err(err);
                }
                error!(store_id = %store.id, error = %err, "Rebuild pass failed");
            }

            match self.sync.sync_indexed_products(store.id).await {
                Ok(_) => {}
                Err(SyncError::AccountNotFound(store_id)) => {
                    // The linkage disappeared between the check above and
                    // now; the next pass re-evaluates it.
                    debug!(%store_id, "Account disappeared mid-pass");
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!(store_id = %store.id, error = %err, "Sync pass failed");
                }
            }
        }

        Ok(())
    }

    /// Run passes forever on a fixed interval. A fatal error aborts the
    /// current pass; the next tick starts a fresh one.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            info!("Sweep pass starting");
            if let Err(err) = self.run_once().await {
                sentry::capture_error(&err);
                error!(error = %err, "Sweep pass aborted");
            }
        }
    }
}
