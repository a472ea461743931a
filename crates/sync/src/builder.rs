//! Catalog snapshot builder.
//!
//! Converts a platform product plus store context into a normalized
//! [`ProductSnapshot`]. Pure with respect to the index store: it only reads
//! the catalog, and the same catalog state always yields a structurally
//! equal snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use pelican_core::{CategoryId, CustomerGroupId};

use crate::catalog::{
    AttributeSource, CatalogError, CatalogProduct, CatalogStore, ProductStatus, ProductType,
    StoreContext,
};
use crate::models::{
    Availability, CategoryPath, ProductSnapshot, SkuSnapshot, VariationSnapshot,
};

/// Attribute codes always exported as custom fields; merchant configuration
/// extends this set, it never replaces it.
pub const DEFAULT_CUSTOM_ATTRIBUTES: &[&str] = &["color", "size", "material", "gtin"];

/// Flag attribute a merchant sets to keep a product out of tagging.
const EXCLUDE_ATTRIBUTE: &str = "recommendations_exclude";

/// Attribute codes read for the well-known snapshot fields.
const DESCRIPTION_ATTRIBUTE: &str = "description";

/// Errors from building a snapshot.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The product type cannot be represented at all (e.g. a bundle with no
    /// configured options). Logged and skipped by batch callers.
    #[error("product cannot be represented: {0}")]
    NonBuildable(String),

    /// Business rules exclude the product from tagging for this store.
    /// Logged and skipped by batch callers.
    #[error("product excluded from tagging: {0}")]
    Filtered(String),

    /// A non-root ancestor on a category path is disabled. The category
    /// walker raises this; the builder skips that category and continues.
    #[error("parent category {0} is disabled")]
    ParentCategoryDisabled(CategoryId),

    /// The catalog backend failed to answer.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Extension point invoked after each part of the snapshot is assembled.
///
/// External enrichment only; the builder never depends on hook behavior.
pub trait SnapshotHook: Send + Sync {
    fn after_product(
        &self,
        _snapshot: &mut ProductSnapshot,
        _product: &CatalogProduct,
        _store: &StoreContext,
    ) {
    }

    fn after_sku(&self, _sku: &mut SkuSnapshot, _child: &CatalogProduct, _store: &StoreContext) {}

    fn after_variation(
        &self,
        _variation: &mut VariationSnapshot,
        _product: &CatalogProduct,
        _store: &StoreContext,
    ) {
    }
}

/// Merchant-tunable build settings.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Additional attribute codes exported as custom fields.
    pub custom_attributes: Vec<String>,
    /// Attribute codes feeding the first tag group.
    pub tag1_attributes: Vec<String>,
    /// Attribute codes feeding the second tag group.
    pub tag2_attributes: Vec<String>,
    /// Attribute codes feeding the third tag group.
    pub tag3_attributes: Vec<String>,
    /// Attribute code holding the brand.
    pub brand_attribute: String,
    /// Attribute code holding the primary image path.
    pub image_attribute: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            custom_attributes: Vec::new(),
            tag1_attributes: vec!["tags".to_string()],
            tag2_attributes: Vec::new(),
            tag3_attributes: Vec::new(),
            brand_attribute: "manufacturer".to_string(),
            image_attribute: "image".to_string(),
        }
    }
}

/// Builds [`ProductSnapshot`]s from live catalog state.
pub struct SnapshotBuilder {
    catalog: Arc<dyn CatalogStore>,
    config: BuilderConfig,
    hooks: Vec<Arc<dyn SnapshotHook>>,
}

impl SnapshotBuilder {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogStore>, config: BuilderConfig) -> Self {
        Self {
            catalog,
            config,
            hooks: Vec::new(),
        }
    }

    /// Register an enrichment hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn SnapshotHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Build the snapshot of `product` as seen from `store`.
    ///
    /// # Errors
    ///
    /// - [`BuildError::Filtered`] when the product is disabled, excluded by
    ///   merchant rule, or not assigned to the store's website.
    /// - [`BuildError::NonBuildable`] when the composite has nothing to
    ///   represent.
    /// - [`BuildError::Catalog`] when the backend fails.
    pub async fn build(
        &self,
        product: &CatalogProduct,
        store: &StoreContext,
    ) -> Result<ProductSnapshot, BuildError> {
        self.check_eligibility(product, store)?;

        let price = group_price(product, store.default_customer_group);
        let availability = availability_in(product, store);
        let categories = self.category_paths(product).await?;
        let custom_fields = self.custom_fields(product);
        let skus = self.build_skus(product, store).await?;
        let variations = self.build_variations(product, store);

        let mut snapshot = ProductSnapshot {
            product_id: product.id,
            name: product.name.clone(),
            url: store.product_url(&product.url_path),
            image_url: self.image_url(product, store),
            price,
            list_price: product.price,
            price_currency_code: store.currency_code,
            availability,
            tags1: self.collect_tags(product, &self.config.tag1_attributes),
            tags2: self.collect_tags(product, &self.config.tag2_attributes),
            tags3: self.collect_tags(product, &self.config.tag3_attributes),
            categories,
            description: product
                .attribute(DESCRIPTION_ATTRIBUTE)
                .map(|value| value.as_text())
                .unwrap_or_default(),
            brand: product
                .attribute(&self.config.brand_attribute)
                .map(|value| value.as_text()),
            date_published: product.published_at,
            skus,
            variations,
            custom_fields,
        };

        for hook in &self.hooks {
            hook.after_product(&mut snapshot, product, store);
        }

        Ok(snapshot)
    }

    fn check_eligibility(
        &self,
        product: &CatalogProduct,
        store: &StoreContext,
    ) -> Result<(), BuildError> {
        if product.status == ProductStatus::Disabled {
            return Err(BuildError::Filtered("product is disabled".to_string()));
        }
        if !product.website_ids.contains(&store.website_id) {
            return Err(BuildError::Filtered(format!(
                "product is not assigned to website {}",
                store.website_id
            )));
        }
        if product
            .attribute(EXCLUDE_ATTRIBUTE)
            .and_then(|value| value.as_flag())
            .unwrap_or(false)
        {
            return Err(BuildError::Filtered(
                "excluded by merchant rule".to_string(),
            ));
        }
        if product.product_type.is_composite() && product.children.is_empty() {
            return Err(BuildError::NonBuildable(format!(
                "{:?} product {} has no configured children",
                product.product_type, product.id
            )));
        }
        Ok(())
    }

    /// Resolve category paths, skipping categories whose ancestry cannot be
    /// walked. Backend failures propagate; a disabled ancestor only costs
    /// that one category.
    async fn category_paths(
        &self,
        product: &CatalogProduct,
    ) -> Result<Vec<CategoryPath>, BuildError> {
        let mut paths = Vec::new();
        for &category_id in &product.category_ids {
            match self.category_path(category_id).await {
                Ok(Some(path)) => paths.push(path),
                Ok(None) => debug!(%category_id, "Category resolved to an empty path, skipped"),
                Err(BuildError::ParentCategoryDisabled(disabled)) => {
                    warn!(%category_id, %disabled, "Skipping category with disabled ancestor");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(paths)
    }

    async fn category_path(&self, id: CategoryId) -> Result<Option<CategoryPath>, BuildError> {
        let Some(category) = self.catalog.category(id).await? else {
            return Ok(None);
        };

        let mut segments = Vec::new();
        for &ancestor_id in &category.path {
            let Some(ancestor) = self.catalog.category(ancestor_id).await? else {
                debug!(%ancestor_id, "Missing ancestor on category path, skipped");
                continue;
            };
            if ancestor.level == 0 {
                // The platform root is not part of merchant-visible paths.
                continue;
            }
            if !ancestor.is_active {
                return Err(BuildError::ParentCategoryDisabled(ancestor.id));
            }
            segments.push(ancestor.name);
        }

        if segments.is_empty() {
            return Ok(None);
        }
        Ok(CategoryPath::new(format!("/{}", segments.join("/"))).ok())
    }

    fn custom_fields(&self, product: &dyn AttributeSource) -> BTreeMap<String, String> {
        let mut codes: BTreeSet<&str> = DEFAULT_CUSTOM_ATTRIBUTES.iter().copied().collect();
        codes.extend(self.config.custom_attributes.iter().map(String::as_str));

        let mut fields = BTreeMap::new();
        for code in codes {
            if let Some(value) = product.attribute(code) {
                fields.insert(code.to_string(), value.as_text());
            }
        }
        fields
    }

    fn collect_tags(&self, product: &CatalogProduct, attributes: &[String]) -> Vec<String> {
        let mut tags = Vec::new();
        for code in attributes {
            if let Some(value) = product.attribute(code) {
                tags.extend(value.as_list());
            }
        }
        tags
    }

    fn image_url(&self, product: &CatalogProduct, store: &StoreContext) -> Option<String> {
        let value = product.attribute(&self.config.image_attribute)?.as_text();
        if value.starts_with("http://") || value.starts_with("https://") {
            Some(value)
        } else {
            Some(store.product_url(&value))
        }
    }

    /// One SKU per child of a configurable product. Disabled children are
    /// skipped; children missing from the store's website surface as
    /// `Discontinued`.
    async fn build_skus(
        &self,
        product: &CatalogProduct,
        store: &StoreContext,
    ) -> Result<Vec<SkuSnapshot>, BuildError> {
        if product.product_type != ProductType::Configurable {
            return Ok(Vec::new());
        }

        let children = self.catalog.products(&product.children, store.id).await?;
        let mut skus = Vec::with_capacity(children.len());
        for child in &children {
            if child.status == ProductStatus::Disabled {
                debug!(child_id = %child.id, "Skipping disabled child");
                continue;
            }

            let mut sku = SkuSnapshot {
                id: child.id,
                name: child.name.clone(),
                price: group_price(child, store.default_customer_group),
                list_price: child.price,
                availability: availability_in(child, store),
                custom_fields: self.custom_fields(child),
                inventory_level: child.stock.quantity,
            };
            for hook in &self.hooks {
                hook.after_sku(&mut sku, child, store);
            }
            skus.push(sku);
        }
        Ok(skus)
    }

    fn build_variations(
        &self,
        product: &CatalogProduct,
        store: &StoreContext,
    ) -> Vec<VariationSnapshot> {
        let availability = availability_in(product, store);
        store
            .customer_groups
            .iter()
            .map(|group| {
                let mut variation = VariationSnapshot {
                    variation_id: group.code.clone(),
                    price: group_price(product, group.id),
                    list_price: product.price,
                    availability,
                };
                for hook in &self.hooks {
                    hook.after_variation(&mut variation, product, store);
                }
                variation
            })
            .collect()
    }
}

/// Availability combines website assignment and stock standing
/// independently: an unassigned product is discontinued for the store no
/// matter its stock.
fn availability_in(product: &CatalogProduct, store: &StoreContext) -> Availability {
    if !product.website_ids.contains(&store.website_id) {
        Availability::Discontinued
    } else if product.stock.in_stock {
        Availability::InStock
    } else {
        Availability::OutOfStock
    }
}

/// Final price for one customer group: the minimum of the group's tier
/// price, the group's catalog-rule price, and the default final price.
/// Tier rows alone cannot express a live discount rule, hence the minimum.
fn group_price(product: &CatalogProduct, group: CustomerGroupId) -> Decimal {
    let mut best = product.final_price;

    for tier in &product.tier_prices {
        let applies = tier.customer_group.is_none_or(|tier_group| tier_group == group);
        if applies && tier.price < best {
            best = tier.price;
        }
    }

    if let Some(&rule_price) = product.rule_prices.get(&group)
        && rule_price < best
    {
        best = rule_price;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::tests_support::{simple_product, store_context};
    use crate::catalog::{Category, InMemoryCatalog, TierPrice};
    use pelican_core::{ProductId, WebsiteId};

    fn builder(catalog: Arc<InMemoryCatalog>) -> SnapshotBuilder {
        SnapshotBuilder::new(catalog, BuilderConfig::default())
    }

    fn seeded_catalog() -> Arc<InMemoryCatalog> {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert_store(store_context(1));
        catalog
    }

    #[tokio::test]
    async fn builds_a_simple_product() {
        let catalog = seeded_catalog();
        let product = simple_product(1, Decimal::new(1000, 2));
        catalog.insert_product(product.clone());
        let store = store_context(1);

        let snapshot = builder(Arc::clone(&catalog))
            .build(&product, &store)
            .await
            .unwrap();

        assert_eq!(snapshot.product_id, ProductId::new(1));
        assert_eq!(snapshot.price, Decimal::new(1000, 2));
        assert_eq!(snapshot.availability, Availability::InStock);
        assert_eq!(snapshot.url, "https://shop.example/product-1");
        // One variation per customer group in the store context.
        assert_eq!(snapshot.variations.len(), 2);
    }

    #[tokio::test]
    async fn disabled_product_is_filtered() {
        let catalog = seeded_catalog();
        let mut product = simple_product(1, Decimal::ONE);
        product.status = ProductStatus::Disabled;
        let store = store_context(1);

        let err = builder(catalog).build(&product, &store).await.unwrap_err();
        assert!(matches!(err, BuildError::Filtered(_)));
    }

    #[tokio::test]
    async fn unassigned_product_is_filtered() {
        let catalog = seeded_catalog();
        let mut product = simple_product(1, Decimal::ONE);
        product.website_ids = vec![WebsiteId::new(9)];
        let store = store_context(1);

        let err = builder(catalog).build(&product, &store).await.unwrap_err();
        assert!(matches!(err, BuildError::Filtered(_)));
    }

    #[tokio::test]
    async fn empty_bundle_is_non_buildable() {
        let catalog = seeded_catalog();
        let mut product = simple_product(1, Decimal::ONE);
        product.product_type = ProductType::Bundle;
        let store = store_context(1);

        let err = builder(catalog).build(&product, &store).await.unwrap_err();
        assert!(matches!(err, BuildError::NonBuildable(_)));
    }

    #[tokio::test]
    async fn out_of_stock_product_keeps_building() {
        let catalog = seeded_catalog();
        let mut product = simple_product(1, Decimal::ONE);
        product.stock.in_stock = false;
        let store = store_context(1);

        let snapshot = builder(catalog).build(&product, &store).await.unwrap();
        assert_eq!(snapshot.availability, Availability::OutOfStock);
    }

    #[tokio::test]
    async fn group_price_takes_the_cheapest_signal() {
        let store = store_context(1);
        let mut product = simple_product(1, Decimal::new(2000, 2));
        product.final_price = Decimal::new(1800, 2);
        product.tier_prices = vec![
            TierPrice {
                customer_group: None,
                price: Decimal::new(1700, 2),
            },
            TierPrice {
                customer_group: Some(store.customer_groups[1].id),
                price: Decimal::new(1500, 2),
            },
        ];
        product
            .rule_prices
            .insert(store.default_customer_group, Decimal::new(1600, 2));

        // Default group: rule price (16.00) beats the all-groups tier (17.00).
        assert_eq!(
            group_price(&product, store.default_customer_group),
            Decimal::new(1600, 2)
        );
        // Wholesale group: its tier price (15.00) wins.
        assert_eq!(
            group_price(&product, store.customer_groups[1].id),
            Decimal::new(1500, 2)
        );
    }

    #[tokio::test]
    async fn configurable_product_gets_one_sku_per_enabled_child() {
        let catalog = seeded_catalog();
        let store = store_context(1);

        let mut parent = simple_product(10, Decimal::new(3000, 2));
        parent.product_type = ProductType::Configurable;
        parent.children = vec![ProductId::new(11), ProductId::new(12), ProductId::new(13)];

        let child_a = simple_product(11, Decimal::new(3000, 2));
        let mut child_b = simple_product(12, Decimal::new(3100, 2));
        child_b.status = ProductStatus::Disabled;
        let mut child_c = simple_product(13, Decimal::new(3200, 2));
        child_c.website_ids = vec![WebsiteId::new(9)];

        catalog.insert_product(parent.clone());
        catalog.insert_product(child_a);
        catalog.insert_product(child_b);
        catalog.insert_product(child_c);

        let snapshot = builder(catalog).build(&parent, &store).await.unwrap();
        assert_eq!(snapshot.skus.len(), 2);
        assert_eq!(snapshot.skus[0].id, ProductId::new(11));
        assert_eq!(snapshot.skus[0].availability, Availability::InStock);
        // Unassigned child stays listed but discontinued for this store.
        assert_eq!(snapshot.skus[1].id, ProductId::new(13));
        assert_eq!(snapshot.skus[1].availability, Availability::Discontinued);
    }

    #[tokio::test]
    async fn category_paths_skip_root_and_disabled_ancestors() {
        let catalog = seeded_catalog();
        let store = store_context(1);

        let root = Category {
            id: pelican_core::CategoryId::new(1),
            name: "Root".to_string(),
            level: 0,
            is_active: true,
            path: vec![pelican_core::CategoryId::new(1)],
        };
        let outdoor = Category {
            id: pelican_core::CategoryId::new(2),
            name: "Outdoor".to_string(),
            level: 1,
            is_active: true,
            path: vec![pelican_core::CategoryId::new(1), pelican_core::CategoryId::new(2)],
        };
        let boats = Category {
            id: pelican_core::CategoryId::new(3),
            name: "Boats".to_string(),
            level: 2,
            is_active: true,
            path: vec![
                pelican_core::CategoryId::new(1),
                pelican_core::CategoryId::new(2),
                pelican_core::CategoryId::new(3),
            ],
        };
        let hidden = Category {
            id: pelican_core::CategoryId::new(4),
            name: "Hidden".to_string(),
            level: 1,
            is_active: false,
            path: vec![pelican_core::CategoryId::new(1), pelican_core::CategoryId::new(4)],
        };
        let under_hidden = Category {
            id: pelican_core::CategoryId::new(5),
            name: "Under Hidden".to_string(),
            level: 2,
            is_active: true,
            path: vec![
                pelican_core::CategoryId::new(1),
                pelican_core::CategoryId::new(4),
                pelican_core::CategoryId::new(5),
            ],
        };
        for category in [root, outdoor, boats, hidden, under_hidden] {
            catalog.insert_category(category);
        }

        let mut product = simple_product(1, Decimal::ONE);
        product.category_ids = vec![
            pelican_core::CategoryId::new(3),
            pelican_core::CategoryId::new(5),
        ];
        let snapshot = builder(catalog).build(&product, &store).await.unwrap();

        // The path under the disabled ancestor is skipped entirely.
        assert_eq!(snapshot.categories.len(), 1);
        assert_eq!(snapshot.categories[0].as_str(), "/Outdoor/Boats");
    }

    #[tokio::test]
    async fn custom_fields_merge_defaults_with_merchant_config() {
        let catalog = seeded_catalog();
        let store = store_context(1);

        let mut product = simple_product(1, Decimal::ONE);
        product.attributes.insert(
            "color".to_string(),
            crate::catalog::AttributeValue::Text("red".to_string()),
        );
        product.attributes.insert(
            "fit".to_string(),
            crate::catalog::AttributeValue::Text("slim".to_string()),
        );

        let mut config = BuilderConfig::default();
        config.custom_attributes = vec!["fit".to_string(), "color".to_string()];
        let builder = SnapshotBuilder::new(catalog, config);

        let snapshot = builder.build(&product, &store).await.unwrap();
        assert_eq!(snapshot.custom_fields.get("color").unwrap(), "red");
        assert_eq!(snapshot.custom_fields.get("fit").unwrap(), "slim");
        // Unset defaults resolve to nothing rather than empty strings.
        assert!(!snapshot.custom_fields.contains_key("size"));
    }

    #[tokio::test]
    async fn hooks_can_enrich_the_snapshot() {
        struct StampHook;
        impl SnapshotHook for StampHook {
            fn after_product(
                &self,
                snapshot: &mut ProductSnapshot,
                _product: &CatalogProduct,
                _store: &StoreContext,
            ) {
                snapshot
                    .custom_fields
                    .insert("stamped".to_string(), "yes".to_string());
            }
        }

        let catalog = seeded_catalog();
        let store = store_context(1);
        let product = simple_product(1, Decimal::ONE);

        let snapshot = builder(catalog)
            .with_hook(Arc::new(StampHook))
            .build(&product, &store)
            .await
            .unwrap();
        assert_eq!(snapshot.custom_fields.get("stamped").unwrap(), "yes");
    }
}
