//! Catalog feed files.
//!
//! The worker binary has no live platform to talk to; it consumes a JSON
//! feed describing stores, categories and products, loaded into an
//! [`InMemoryCatalog`] at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{CatalogProduct, Category, InMemoryCatalog, StoreContext};

/// The on-disk feed shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFeed {
    pub stores: Vec<StoreContext>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub products: Vec<CatalogProduct>,
}

/// Errors loading a feed file.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read feed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse feed file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CatalogFeed {
    /// Load a feed from disk.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, FeedError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Seed an in-memory catalog from the feed.
    #[must_use]
    pub fn into_catalog(self) -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        let (stores, categories, products) =
            (self.stores.len(), self.categories.len(), self.products.len());
        for store in self.stores {
            catalog.insert_store(store);
        }
        for category in self.categories {
            catalog.insert_category(category);
        }
        for product in self.products {
            catalog.insert_product(product);
        }
        info!(stores, categories, products, "Loaded catalog feed");
        catalog
    }
}
