//! Pelican Worker - the long-running sync daemon.
//!
//! Wires the engine together and runs three things side by side:
//!
//! - a task consumer draining queue fan-out chunks into the
//!   invalidate -> rebuild -> sync path
//! - a periodic sweeper as the safety net behind the event path
//! - a small status endpoint exposing per-store dirty/out-of-sync counts

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pelican_sync::api::{
    AccountStore, CachedAccountStore, ConfigAccountStore, HttpRecommendationApi, RecommendationApi,
};
use pelican_sync::catalog::{CatalogFeed, CatalogStore, InMemoryCatalog};
use pelican_sync::instrument::MemoryGuard;
use pelican_sync::services::{
    ChannelDispatcher, InvalidationService, QueueProcessor, QueuePublisher, RebuildService,
    Sweeper, SyncService, TaskConsumer,
};
use pelican_sync::{AppState, Config, SnapshotBuilder};

/// Initialize Sentry error tracking and return a guard that must be kept
/// alive for the process lifetime.
fn init_sentry(config: &Config) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    info!("Sentry initialized");
    Some(guard)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let _sentry_guard = init_sentry(&config);

    let pool = pelican_sync::db::create_pool(&config.database_url).await?;
    pelican_sync::db::migrate(&pool).await?;
    info!(database_url = %config.database_url, "Index store ready");

    let catalog: Arc<dyn CatalogStore> = match &config.catalog_feed {
        Some(path) => Arc::new(CatalogFeed::load(path)?.into_catalog()),
        None => {
            warn!("No catalog feed configured, starting with an empty catalog");
            Arc::new(InMemoryCatalog::new())
        }
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
    let invalidation = Arc::new(InvalidationService::new(
        pool.clone(),
        Arc::clone(&catalog),
        config.invalidate_page_size,
    ));
    let rebuild = Arc::new(RebuildService::new(
        pool.clone(),
        Arc::clone(&catalog),
        builder,
        memory_guard,
        config.rebuild_page_size,
    ));
    let sync = Arc::new(SyncService::new(
        pool.clone(),
        Arc::clone(&api),
        Arc::clone(&accounts),
        memory_guard,
        config.sync_batch_size,
    ));

    let (dispatcher, tasks) = ChannelDispatcher::channel();
    let queue = Arc::new(QueueProcessor::new(
        pool.clone(),
        QueuePublisher::new(Arc::new(dispatcher), config.queue_chunk_size),
    ));

    let consumer = TaskConsumer::new(
        Arc::clone(&invalidation),
        Arc::clone(&rebuild),
        Arc::clone(&sync),
    );
    tokio::spawn(async move { consumer.run(tasks).await });

    let sweeper = Arc::new(Sweeper::new(
        catalog,
        accounts,
        invalidation,
        rebuild,
        sync,
        queue,
    ));
    tokio::spawn(Arc::clone(&sweeper).run(config.sweep_interval));

    let addr = SocketAddr::from((config.status_host, config.status_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Status endpoint listening");

    axum::serve(listener, pelican_sync::routes::router(AppState::new(pool)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
