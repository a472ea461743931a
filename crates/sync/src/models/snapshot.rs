//! The product snapshot: a normalized, serializable view of a catalog
//! product used for both storefront tagging and API upload.
//!
//! Snapshots are persisted as schema-tagged JSON (see [`SnapshotEnvelope`])
//! so that the rebuild path can deserialize a previously stored snapshot and
//! compare it against a freshly built one across code versions. A blob that
//! fails to decode is treated as "differs", never as an error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pelican_core::{CurrencyCode, ProductId};

/// Serialization format version for stored snapshots.
///
/// Bump this when the snapshot shape changes in a way that makes stored
/// blobs incomparable; old entries then decode to `None` and resync.
pub const SCHEMA_VERSION: u32 = 1;

/// Product availability as exposed to the recommendation platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    InStock,
    OutOfStock,
    Discontinued,
}

/// A category membership expressed as a full path, e.g.
/// `/Outdoor/Boats/Canoes`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryPath(String);

impl CategoryPath {
    /// Create a category path. The path must be non-empty.
    pub fn new(path: impl Into<String>) -> Result<Self, EmptyCategoryPath> {
        let path = path.into();
        if path.is_empty() {
            return Err(EmptyCategoryPath);
        }
        Ok(Self(path))
    }

    /// The path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when constructing a [`CategoryPath`] from an empty string.
#[derive(Debug, Error)]
#[error("category path must not be empty")]
pub struct EmptyCategoryPath;

/// A variant of a configurable product, independently priced and stocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub list_price: Decimal,
    pub availability: Availability,
    /// Merchant-selected attribute values for this variant.
    pub custom_fields: BTreeMap<String, String>,
    /// Units on hand.
    pub inventory_level: i64,
}

/// Per-customer-group pricing of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationSnapshot {
    /// Customer group code, e.g. `general` or `wholesale`.
    pub variation_id: String,
    pub price: Decimal,
    pub list_price: Decimal,
    pub availability: Availability,
}

/// The normalized snapshot of a product for one store scope.
///
/// All fields are immutable once built; the only way to change a snapshot is
/// a full rebuild from the live catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub url: String,
    pub image_url: Option<String>,
    /// Final price for the store's default customer group.
    pub price: Decimal,
    /// Undiscounted list price.
    pub list_price: Decimal,
    pub price_currency_code: CurrencyCode,
    pub availability: Availability,
    /// First named tag group (ordered).
    pub tags1: Vec<String>,
    /// Second named tag group (ordered).
    pub tags2: Vec<String>,
    /// Third named tag group (ordered).
    pub tags3: Vec<String>,
    pub categories: Vec<CategoryPath>,
    pub description: String,
    pub brand: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
    pub skus: Vec<SkuSnapshot>,
    pub variations: Vec<VariationSnapshot>,
    pub custom_fields: BTreeMap<String, String>,
}

impl ProductSnapshot {
    /// Structural equality, independent of the order in which sibling
    /// collections were assembled.
    ///
    /// Tag groups are ordered lists and compare as-is; SKUs, variations and
    /// categories are sets keyed by id/group/path and compare after
    /// normalization.
    #[must_use]
    pub fn structurally_equals(&self, other: &Self) -> bool {
        self.clone().normalized() == other.clone().normalized()
    }

    /// Sort sibling collections into a canonical order.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.skus.sort_by_key(|sku| sku.id);
        self.variations
            .sort_by(|a, b| a.variation_id.cmp(&b.variation_id));
        self.categories.sort();
        self
    }
}

/// Versioned wrapper for the serialized snapshot blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub schema_version: u32,
    pub product: ProductSnapshot,
}

impl SnapshotEnvelope {
    /// Wrap a snapshot in the current schema version.
    #[must_use]
    pub const fn new(product: ProductSnapshot) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            product,
        }
    }

    /// Serialize to the stored-blob form.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails (it does not for
    /// well-formed snapshots; the `Result` exists for the serializer's sake).
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored blob into a snapshot.
    ///
    /// Returns `None` for malformed JSON or a mismatched schema version; the
    /// caller treats both as "stored snapshot differs", forcing a resync.
    #[must_use]
    pub fn decode(blob: &str) -> Option<ProductSnapshot> {
        let envelope: Self = serde_json::from_str(blob).ok()?;
        if envelope.schema_version != SCHEMA_VERSION {
            return None;
        }
        Some(envelope.product)
    }
}
