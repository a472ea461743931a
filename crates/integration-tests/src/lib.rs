//! Shared fixtures for the integration tests.
//!
//! Wires a full engine against an in-memory `SQLite` index store, an
//! in-memory catalog and a recording API double, mirroring how the worker
//! binary assembles the real thing.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use pelican_core::{CurrencyCode, CustomerGroupId, ProductId, StoreId, WebsiteId};
use pelican_sync::api::{
    AccountCredentials, AccountStore, ApiError, ConfigAccountStore, RecommendationApi,
};
use pelican_sync::catalog::{
    CatalogProduct, CatalogStore, CustomerGroup, InMemoryCatalog, ProductStatus, ProductType,
    StockInfo, StoreContext,
};
use pelican_sync::instrument::MemoryGuard;
use pelican_sync::models::ProductSnapshot;
use pelican_sync::services::{InvalidationService, RebuildService, SyncService};
use pelican_sync::{BuilderConfig, SnapshotBuilder};

/// Records every API call; individual upsert calls can be scripted to fail.
#[derive(Default)]
pub struct RecordingApi {
    pub upsert_batches: Mutex<Vec<Vec<ProductSnapshot>>>,
    pub delete_batches: Mutex<Vec<Vec<ProductId>>>,
    /// 0-based indices of upsert calls that must fail.
    pub failing_upsert_calls: Vec<usize>,
}

impl RecordingApi {
    /// Product ids pushed across all upsert batches, in call order.
    pub fn upserted_ids(&self) -> Vec<ProductId> {
        self.upsert_batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|snapshot| snapshot.product_id)
            .collect()
    }
}

#[async_trait]
impl RecommendationApi for RecordingApi {
    async fn upsert(
        &self,
        _account: &AccountCredentials,
        products: &[ProductSnapshot],
    ) -> Result<(), ApiError> {
        let mut batches = self.upsert_batches.lock().unwrap();
        let call_index = batches.len();
        batches.push(products.to_vec());
        if self.failing_upsert_calls.contains(&call_index) {
            return Err(ApiError::Status {
                status: 502,
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    async fn delete(
        &self,
        _account: &AccountCredentials,
        product_ids: &[ProductId],
    ) -> Result<(), ApiError> {
        self.delete_batches
            .lock()
            .unwrap()
            .push(product_ids.to_vec());
        Ok(())
    }
}

/// A fully wired engine over in-memory backends.
pub struct TestEngine {
    pub pool: SqlitePool,
    pub catalog: Arc<InMemoryCatalog>,
    pub api: Arc<RecordingApi>,
    pub invalidation: Arc<InvalidationService>,
    pub rebuild: Arc<RebuildService>,
    pub sync: Arc<SyncService>,
}

/// The store every fixture seeds by default.
pub const STORE: StoreId = StoreId::new(1);

impl TestEngine {
    /// Engine with a working account for [`STORE`] and a clean API double.
    pub async fn new() -> Self {
        Self::with_api(RecordingApi::default()).await
    }

    /// Engine with a scripted API double.
    pub async fn with_api(api: RecordingApi) -> Self {
        // One connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        pelican_sync::db::migrate(&pool).await.expect("migrations");

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert_store(test_store(STORE));

        let catalog_dyn: Arc<dyn CatalogStore> = Arc::clone(&catalog) as Arc<dyn CatalogStore>;
        let api = Arc::new(api);
        let accounts: Arc<dyn AccountStore> = Arc::new(ConfigAccountStore::new(vec![(
            STORE,
            AccountCredentials {
                merchant_id: "merchant-1".to_string(),
                domain: "shop.example".to_string(),
                api_token: SecretString::from("test-token".to_string()),
            },
        )]));
        let builder = Arc::new(SnapshotBuilder::new(
            Arc::clone(&catalog_dyn),
            BuilderConfig::default(),
        ));

        Self {
            invalidation: Arc::new(InvalidationService::new(
                pool.clone(),
                Arc::clone(&catalog_dyn),
                100,
            )),
            rebuild: Arc::new(RebuildService::new(
                pool.clone(),
                Arc::clone(&catalog_dyn),
                builder,
                MemoryGuard::unbounded(),
                100,
            )),
            sync: Arc::new(SyncService::new(
                pool.clone(),
                Arc::clone(&api) as Arc<dyn RecommendationApi>,
                accounts,
                MemoryGuard::unbounded(),
                50,
            )),
            pool,
            catalog,
            api,
        }
    }
}

/// Store context used across the integration tests.
pub fn test_store(id: StoreId) -> StoreContext {
    StoreContext {
        id,
        website_id: WebsiteId::new(1),
        currency_code: CurrencyCode::EUR,
        locale: "en_US".to_string(),
        base_url: "https://shop.example".to_string(),
        customer_groups: vec![CustomerGroup {
            id: CustomerGroupId::new(0),
            code: "general".to_string(),
        }],
        default_customer_group: CustomerGroupId::new(0),
    }
}

/// A simple, in-stock product assigned to the default store.
pub fn simple_product(id: i64, price: Decimal) -> CatalogProduct {
    CatalogProduct {
        id: ProductId::new(id),
        product_type: ProductType::Simple,
        status: ProductStatus::Enabled,
        name: format!("Product {id}"),
        url_path: format!("/product-{id}"),
        price,
        final_price: price,
        tier_prices: Vec::new(),
        rule_prices: BTreeMap::new(),
        price_schedule: None,
        stock: StockInfo {
            in_stock: true,
            quantity: 10,
        },
        website_ids: vec![WebsiteId::new(1)],
        children: Vec::new(),
        category_ids: Vec::new(),
        published_at: None,
        attributes: BTreeMap::new(),
    }
}
