//! Catalog collaborator: read access to the host platform's products,
//! categories and stores.
//!
//! The engine never owns catalog data; it reads it through [`CatalogStore`]
//! and reacts to change notifications. Attribute lookup is a typed key-value
//! capability ([`AttributeSource`]) rather than a reflective EAV walk, so
//! any backend that can answer `attribute(code)` can feed the snapshot
//! builder.

pub mod feed;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pelican_core::{CategoryId, CurrencyCode, CustomerGroupId, ProductId, StoreId, WebsiteId};

pub use feed::{CatalogFeed, FeedError};
pub use memory::InMemoryCatalog;

/// Product composition type. Composite types (configurable, bundle,
/// grouped) subsume their children's indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Simple,
    Virtual,
    Configurable,
    Bundle,
    Grouped,
}

impl ProductType {
    /// Whether this type is composed of other products.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Configurable | Self::Bundle | Self::Grouped)
    }
}

/// Platform-side enable/disable switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Enabled,
    Disabled,
}

/// Stock standing of a product in a store scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInfo {
    pub in_stock: bool,
    pub quantity: i64,
}

/// A row-level tier price. `customer_group = None` applies to all groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPrice {
    pub customer_group: Option<CustomerGroupId>,
    pub price: Decimal,
}

/// An active pricing-schedule window (catalog price rule with start/end).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSchedule {
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl PriceSchedule {
    /// Whether the schedule is active at `at`.
    #[must_use]
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && self.ends_at.is_none_or(|end| at < end)
    }
}

/// A typed attribute value resolved from the platform's attribute system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    List(Vec<String>),
    Number(Decimal),
    Text(String),
}

impl AttributeValue {
    /// Render the value as the string form used in snapshot custom fields.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Flag(value) => value.to_string(),
            Self::List(values) => values.join(", "),
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    /// The boolean reading of the value, if it has one.
    #[must_use]
    pub const fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            _ => None,
        }
    }

    /// The list reading of the value; scalars read as a single-element list.
    #[must_use]
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::List(values) => values.clone(),
            other => vec![other.as_text()],
        }
    }
}

/// Typed key-value attribute lookup.
pub trait AttributeSource {
    /// Resolve an attribute by code, if present.
    fn attribute(&self, code: &str) -> Option<AttributeValue>;
}

/// A platform product as loaded in one store scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub product_type: ProductType,
    pub status: ProductStatus,
    pub name: String,
    /// URL path relative to the store base URL.
    pub url_path: String,
    /// Undiscounted list price.
    pub price: Decimal,
    /// Final price for the default customer group, catalog rules applied.
    pub final_price: Decimal,
    #[serde(default)]
    pub tier_prices: Vec<TierPrice>,
    /// Per-group prices produced by catalog price rules.
    #[serde(default)]
    pub rule_prices: BTreeMap<CustomerGroupId, Decimal>,
    #[serde(default)]
    pub price_schedule: Option<PriceSchedule>,
    pub stock: StockInfo,
    pub website_ids: Vec<WebsiteId>,
    /// Children of a composite product, in platform order.
    #[serde(default)]
    pub children: Vec<ProductId>,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl AttributeSource for CatalogProduct {
    fn attribute(&self, code: &str) -> Option<AttributeValue> {
        self.attributes.get(code).cloned()
    }
}

/// A category node. `path` lists ancestor ids from the root down to the
/// node itself, platform style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub level: u32,
    pub is_active: bool,
    pub path: Vec<CategoryId>,
}

/// A customer group within a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerGroup {
    pub id: CustomerGroupId,
    pub code: String,
}

/// Store-scope configuration needed to build snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreContext {
    pub id: StoreId,
    pub website_id: WebsiteId,
    pub currency_code: CurrencyCode,
    pub locale: String,
    /// Absolute base URL of the storefront, no trailing slash required.
    pub base_url: String,
    pub customer_groups: Vec<CustomerGroup>,
    pub default_customer_group: CustomerGroupId,
}

impl StoreContext {
    /// Absolute product URL for this store.
    #[must_use]
    pub fn product_url(&self, url_path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url_path.trim_start_matches('/')
        )
    }
}

/// Errors surfaced by a catalog backend.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backend failed to answer (connection, protocol, data shape).
    #[error("catalog backend error: {0}")]
    Backend(String),
}

/// Read access to the host platform's catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Load one product in a store scope.
    async fn product(
        &self,
        id: ProductId,
        store: StoreId,
    ) -> Result<Option<CatalogProduct>, CatalogError>;

    /// Load several products in a store scope; missing ids are skipped.
    async fn products(
        &self,
        ids: &[ProductId],
        store: StoreId,
    ) -> Result<Vec<CatalogProduct>, CatalogError>;

    /// Enumerate product ids assigned to a store, a page at a time.
    async fn product_ids(
        &self,
        store: StoreId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ProductId>, CatalogError>;

    /// Composite parents of a child/variant product, if any.
    async fn parent_ids(&self, child: ProductId) -> Result<Vec<ProductId>, CatalogError>;

    /// Load a category node.
    async fn category(&self, id: CategoryId) -> Result<Option<Category>, CatalogError>;

    /// Load one store's context.
    async fn store(&self, id: StoreId) -> Result<Option<StoreContext>, CatalogError>;

    /// All configured stores.
    async fn stores(&self) -> Result<Vec<StoreContext>, CatalogError>;

    /// Ids of products whose pricing schedule is active at `at`; used by the
    /// invalidation sweep to surface scheduled price changes without a save
    /// event.
    async fn scheduled_price_product_ids(
        &self,
        store: StoreId,
        at: DateTime<Utc>,
    ) -> Result<Vec<ProductId>, CatalogError>;
}
