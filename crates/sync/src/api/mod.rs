//! Recommendation platform collaborators: the upsert/delete API client and
//! account resolution.
//!
//! The API is a black box with two bulk operations; every call carries a
//! bounded response timeout. Account resolution answers "which merchant
//! account is linked to this store", or `None` when the store has no
//! account (sync is then skipped for that store entirely).

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::SecretString;
use thiserror::Error;

use pelican_core::{ProductId, StoreId};

use crate::models::ProductSnapshot;

pub use http::HttpRecommendationApi;

/// Credentials for one merchant account on the recommendation platform.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    /// Merchant account identifier.
    pub merchant_id: String,
    /// Storefront domain registered with the account.
    pub domain: String,
    /// API token (never logged).
    pub api_token: SecretString,
}

/// Errors from the recommendation API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP transport failure, including response timeouts.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the platform.
    #[error("api returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Request payload could not be built.
    #[error("invalid api payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("invalid api url: {0}")]
    Url(#[from] url::ParseError),
}

/// The external upsert/delete API.
#[async_trait]
pub trait RecommendationApi: Send + Sync {
    /// Push a batch of snapshots upstream.
    async fn upsert(
        &self,
        account: &AccountCredentials,
        products: &[ProductSnapshot],
    ) -> Result<(), ApiError>;

    /// Remove a batch of products upstream.
    async fn delete(
        &self,
        account: &AccountCredentials,
        product_ids: &[ProductId],
    ) -> Result<(), ApiError>;
}

/// Store-to-account resolution.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// The account linked to a store, or `None` when the platform is not
    /// installed for that store.
    async fn account_for_store(&self, store: StoreId) -> Option<AccountCredentials>;
}

/// Account resolution backed by static configuration.
#[derive(Debug, Clone)]
pub struct ConfigAccountStore {
    accounts: Vec<(StoreId, AccountCredentials)>,
}

impl ConfigAccountStore {
    #[must_use]
    pub fn new(accounts: Vec<(StoreId, AccountCredentials)>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl AccountStore for ConfigAccountStore {
    async fn account_for_store(&self, store: StoreId) -> Option<AccountCredentials> {
        self.accounts
            .iter()
            .find(|(id, _)| *id == store)
            .map(|(_, account)| account.clone())
    }
}

/// TTL-cached wrapper around an [`AccountStore`].
///
/// Lookups happen on every sync sweep and task; the linkage itself changes
/// rarely, so a short-lived cache keeps the hot path cheap.
pub struct CachedAccountStore {
    inner: Arc<dyn AccountStore>,
    cache: Cache<StoreId, Option<AccountCredentials>>,
}

impl CachedAccountStore {
    /// Wrap an account store with a TTL cache.
    #[must_use]
    pub fn new(inner: Arc<dyn AccountStore>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder().time_to_live(ttl).max_capacity(1024).build(),
        }
    }
}

#[async_trait]
impl AccountStore for CachedAccountStore {
    async fn account_for_store(&self, store: StoreId) -> Option<AccountCredentials> {
        let inner = Arc::clone(&self.inner);
        self.cache
            .get_with(store, async move { inner.account_for_store(store).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(merchant: &str) -> AccountCredentials {
        AccountCredentials {
            merchant_id: merchant.to_string(),
            domain: "shop.example".to_string(),
            api_token: SecretString::from("token".to_string()),
        }
    }

    #[tokio::test]
    async fn config_store_resolves_by_store_id() {
        let store = ConfigAccountStore::new(vec![(StoreId::new(1), credentials("m-1"))]);
        let found = store.account_for_store(StoreId::new(1)).await.unwrap();
        assert_eq!(found.merchant_id, "m-1");
        assert!(store.account_for_store(StoreId::new(2)).await.is_none());
    }

    #[tokio::test]
    async fn cached_store_serves_from_cache() {
        let inner = Arc::new(ConfigAccountStore::new(vec![(
            StoreId::new(1),
            credentials("m-1"),
        )]));
        let cached = CachedAccountStore::new(inner, Duration::from_secs(60));

        assert!(cached.account_for_store(StoreId::new(1)).await.is_some());
        assert!(cached.account_for_store(StoreId::new(1)).await.is_some());
        assert!(cached.account_for_store(StoreId::new(9)).await.is_none());
    }
}
