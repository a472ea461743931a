//! HTTP client for the recommendation platform's bulk endpoints.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use url::Url;

use pelican_core::ProductId;

use crate::models::ProductSnapshot;

use super::{AccountCredentials, ApiError, RecommendationApi};

/// Response timeout for upsert calls.
pub const DEFAULT_UPSERT_TIMEOUT: Duration = Duration::from_secs(60);
/// Response timeout for delete calls.
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    products: &'a [ProductSnapshot],
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    product_ids: &'a [ProductId],
}

/// JSON-over-HTTP implementation of [`RecommendationApi`].
#[derive(Debug, Clone)]
pub struct HttpRecommendationApi {
    client: reqwest::Client,
    base_url: Url,
    upsert_timeout: Duration,
    delete_timeout: Duration,
}

impl HttpRecommendationApi {
    /// Build a client against the platform base URL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the underlying client cannot be built.
    pub fn new(
        base_url: Url,
        upsert_timeout: Duration,
        delete_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pelican-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            upsert_timeout,
            delete_timeout,
        })
    }

    fn endpoint(&self, account: &AccountCredentials, operation: &str) -> Result<Url, ApiError> {
        Ok(self
            .base_url
            .join(&format!("v1/{}/products/{operation}", account.merchant_id))?)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        account: &AccountCredentials,
        operation: &str,
        timeout: Duration,
        body: &T,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(account, operation)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(account.api_token.expose_secret())
            .header("X-Storefront-Domain", &account.domain)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl RecommendationApi for HttpRecommendationApi {
    async fn upsert(
        &self,
        account: &AccountCredentials,
        products: &[ProductSnapshot],
    ) -> Result<(), ApiError> {
        self.post(
            account,
            "upsert",
            self.upsert_timeout,
            &UpsertRequest { products },
        )
        .await
    }

    async fn delete(
        &self,
        account: &AccountCredentials,
        product_ids: &[ProductId],
    ) -> Result<(), ApiError> {
        self.post(
            account,
            "delete",
            self.delete_timeout,
            &DeleteRequest { product_ids },
        )
        .await
    }
}
