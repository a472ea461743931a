//! In-memory catalog backend.
//!
//! Backs the worker's feed mode and the test suites. Parent resolution is
//! derived from composite products' child lists rather than stored
//! separately, so seeding a configurable automatically links its children.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pelican_core::{CategoryId, ProductId, StoreId};

use super::{CatalogError, CatalogProduct, CatalogStore, Category, StoreContext};

#[derive(Debug, Default)]
struct Inner {
    stores: Vec<StoreContext>,
    products: HashMap<ProductId, CatalogProduct>,
    categories: HashMap<CategoryId, Category>,
}

/// A catalog held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    inner: RwLock<Inner>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a store.
    pub fn insert_store(&self, store: StoreContext) {
        let mut inner = self.write();
        inner.stores.retain(|existing| existing.id != store.id);
        inner.stores.push(store);
    }

    /// Add or replace a product.
    pub fn insert_product(&self, product: CatalogProduct) {
        self.write().products.insert(product.id, product);
    }

    /// Add or replace a category.
    pub fn insert_category(&self, category: Category) {
        self.write().categories.insert(category.id, category);
    }

    /// Mutate a seeded product in place; no-op when absent.
    pub fn update_product(&self, id: ProductId, mutate: impl FnOnce(&mut CatalogProduct)) {
        if let Some(product) = self.write().products.get_mut(&id) {
            mutate(product);
        }
    }

    /// Remove a product entirely (simulates platform-side deletion).
    pub fn remove_product(&self, id: ProductId) {
        self.write().products.remove(&id);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn visible_in(product: &CatalogProduct, store: &StoreContext) -> bool {
        product.website_ids.contains(&store.website_id)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn product(
        &self,
        id: ProductId,
        _store: StoreId,
    ) -> Result<Option<CatalogProduct>, CatalogError> {
        Ok(self.read().products.get(&id).cloned())
    }

    async fn products(
        &self,
        ids: &[ProductId],
        _store: StoreId,
    ) -> Result<Vec<CatalogProduct>, CatalogError> {
        let inner = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.products.get(id).cloned())
            .collect())
    }

    async fn product_ids(
        &self,
        store: StoreId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ProductId>, CatalogError> {
        let inner = self.read();
        let Some(store) = inner.stores.iter().find(|s| s.id == store) else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<ProductId> = inner
            .products
            .values()
            .filter(|product| Self::visible_in(product, store))
            .map(|product| product.id)
            .collect();
        ids.sort_unstable();
        Ok(ids
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn parent_ids(&self, child: ProductId) -> Result<Vec<ProductId>, CatalogError> {
        let inner = self.read();
        let mut parents: Vec<ProductId> = inner
            .products
            .values()
            .filter(|product| {
                product.product_type.is_composite() && product.children.contains(&child)
            })
            .map(|product| product.id)
            .collect();
        parents.sort_unstable();
        Ok(parents)
    }

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, CatalogError> {
        Ok(self.read().categories.get(&id).cloned())
    }

    async fn store(&self, id: StoreId) -> Result<Option<StoreContext>, CatalogError> {
        Ok(self.read().stores.iter().find(|s| s.id == id).cloned())
    }

    async fn stores(&self) -> Result<Vec<StoreContext>, CatalogError> {
        Ok(self.read().stores.clone())
    }

    async fn scheduled_price_product_ids(
        &self,
        store: StoreId,
        at: DateTime<Utc>,
    ) -> Result<Vec<ProductId>, CatalogError> {
        let inner = self.read();
        let Some(store) = inner.stores.iter().find(|s| s.id == store) else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<ProductId> = inner
            .products
            .values()
            .filter(|product| Self::visible_in(product, store))
            .filter(|product| {
                product
                    .price_schedule
                    .as_ref()
                    .is_some_and(|schedule| schedule.is_active(at))
            })
            .map(|product| product.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}


#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use pelican_core::{ProductId, StoreId};

    use super::tests_support::{simple_product, store_context};
    use super::*;
    use crate::catalog::ProductType;

    #[tokio::test]
    async fn parent_resolution_is_derived_from_children() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_store(store_context(1));

        let mut parent = simple_product(10, Decimal::new(2000, 2));
        parent.product_type = ProductType::Configurable;
        parent.children = vec![ProductId::new(11), ProductId::new(12)];
        catalog.insert_product(parent);
        catalog.insert_product(simple_product(11, Decimal::new(2000, 2)));
        catalog.insert_product(simple_product(12, Decimal::new(2100, 2)));

        let parents = catalog.parent_ids(ProductId::new(11)).await.unwrap();
        assert_eq!(parents, vec![ProductId::new(10)]);
        assert!(catalog.parent_ids(ProductId::new(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn product_ids_are_scoped_to_store_website() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_store(store_context(1));
        catalog.insert_product(simple_product(1, Decimal::new(1000, 2)));
        let mut foreign = simple_product(2, Decimal::new(1000, 2));
        foreign.website_ids = vec![pelican_core::WebsiteId::new(9)];
        catalog.insert_product(foreign);

        let ids = catalog.product_ids(StoreId::new(1), 0, 100).await.unwrap();
        assert_eq!(ids, vec![ProductId::new(1)]);
    }
}
