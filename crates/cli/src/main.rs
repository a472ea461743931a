//! Pelican CLI - migrations and one-shot sweep commands.
//!
//! Every command loads the same environment-driven configuration as the
//! worker, so a cron job can run `pelican rebuild --store 1` against the
//! same index store the daemon uses.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pelican_core::{ProductId, StoreId};
use pelican_sync::api::{
    AccountStore, CachedAccountStore, ConfigAccountStore, HttpRecommendationApi, RecommendationApi,
};
use pelican_sync::catalog::{CatalogFeed, CatalogStore, InMemoryCatalog};
use pelican_sync::db::IndexEntryRepository;
use pelican_sync::instrument::MemoryGuard;
use pelican_sync::services::{InvalidationService, RebuildService, SyncService};
use pelican_sync::{Config, SnapshotBuilder};

#[derive(Parser)]
#[command(name = "pelican", about = "Pelican catalog sync management tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending index store migrations.
    Migrate,
    /// Show dirty / out-of-sync counts for a store.
    Status {
        /// Store id to inspect.
        #[arg(long)]
        store: i64,
    },
    /// Flag products dirty for a store (all feed products when no ids are
    /// given).
    Invalidate {
        /// Store id to invalidate in.
        #[arg(long)]
        store: i64,
        /// Product ids; omit to invalidate every product visible in the
        /// store.
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
    },
    /// Rebuild dirty entries for a store.
    Rebuild {
        /// Store id to rebuild.
        #[arg(long)]
        store: i64,
    },
    /// Push out-of-sync entries and purge deletions for a store.
    Sync {
        /// Store id to sync.
        #[arg(long)]
        store: i64,
    },
}

struct Engine {
    pool: sqlx::SqlitePool,
    catalog: Arc<dyn CatalogStore>,
    invalidation: InvalidationService,
    rebuild: RebuildService,
    sync: SyncService,
}

async fn wire(config: &Config) -> Result<Engine, Box<dyn std::error::Error>> {
    let pool = pelican_sync::db::create_pool(&config.database_url).await?;
    pelican_sync::db::migrate(&pool).await?;

    let catalog: Arc<dyn CatalogStore> = match &config.catalog_feed {
        Some(path) => Arc::new(CatalogFeed::load(path)?.into_catalog()),
        None => Arc::new(InMemoryCatalog::new()),
    };
    let accounts: Arc<dyn AccountStore> = Arc::new(CachedAccountStore::new(
        Arc::new(ConfigAccountStore::new(config.accounts.clone())),
        config.account_cache_ttl,
    ));
    let api: Arc<dyn RecommendationApi> = Arc::new(HttpRecommendationApi::new(
        config.api_base_url.clone(),
        config.upsert_timeout,
        config.delete_timeout,
    )?);
    let memory_guard = MemoryGuard::new(config.memory_limit_mb, config.memory_max_percent);
    let builder = Arc::new(SnapshotBuilder::new(
        Arc::clone(&catalog),
        config.builder_config(),
    ));

    Ok(Engine {
        invalidation: InvalidationService::new(
            pool.clone(),
            Arc::clone(&catalog),
            config.invalidate_page_size,
        ),
        rebuild: RebuildService::new(
            pool.clone(),
            Arc::clone(&catalog),
            builder,
            memory_guard,
            config.rebuild_page_size,
        ),
        sync: SyncService::new(
            pool.clone(),
            api,
            accounts,
            memory_guard,
            config.sync_batch_size,
        ),
        catalog,
        pool,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Migrate => {
            let pool = pelican_sync::db::create_pool(&config.database_url).await?;
            pelican_sync::db::migrate(&pool).await?;
            info!("Migrations applied");
        }
        Command::Status { store } => {
            let engine = wire(&config).await?;
            let store_id = StoreId::new(store);
            let repo = IndexEntryRepository::new(&engine.pool);
            let dirty = repo.count_dirty(store_id).await?;
            let out_of_sync = repo.count_out_of_sync(store_id).await?;
            info!(%store_id, dirty, out_of_sync, "Store status");
        }
        Command::Invalidate { store, ids } => {
            let engine = wire(&config).await?;
            let store_id = StoreId::new(store);
            let product_ids: Vec<ProductId> = if ids.is_empty() {
                engine.catalog.product_ids(store_id, 0, u64::MAX).await?
            } else {
                ids.into_iter().map(ProductId::new).collect()
            };
            let flagged = engine
                .invalidation
                .invalidate_or_create(&product_ids, store_id)
                .await?
                .len();
            info!(%store_id, flagged, "Invalidation finished");
        }
        Command::Rebuild { store } => {
            let engine = wire(&config).await?;
            let store_id = StoreId::new(store);
            let rebuilt = engine.rebuild.rebuild_dirty_products(store_id, None).await?;
            info!(%store_id, rebuilt, "Rebuild finished");
        }
        Command::Sync { store } => {
            let engine = wire(&config).await?;
            let store_id = StoreId::new(store);
            let marked = engine.sync.sync_indexed_products(store_id).await?;
            info!(%store_id, marked, "Sync finished");
        }
    }

    Ok(())
}
