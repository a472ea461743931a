//! End-to-end pipeline scenario: invalidate -> rebuild -> sync, then a
//! price change through the same cycle.

use rust_decimal::Decimal;

use pelican_core::ProductId;
use pelican_integration_tests::{STORE, TestEngine, simple_product};
use pelican_sync::db::IndexEntryRepository;
use pelican_sync::models::Availability;

#[tokio::test]
async fn full_lifecycle_of_a_simple_product() {
    let engine = TestEngine::new().await;
    let product = ProductId::new(1);
    engine
        .catalog
        .insert_product(simple_product(1, Decimal::new(1000, 2)));

    // No prior entry; invalidation creates it dirty with no snapshot.
    engine
        .invalidation
        .invalidate_or_create(&[product], STORE)
        .await
        .unwrap();
    let repo = IndexEntryRepository::new(&engine.pool);
    let entry = repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.is_dirty);
    assert!(entry.product_data.is_none());

    // Rebuild fills the snapshot and leaves the entry awaiting sync.
    engine.rebuild.rebuild_dirty_products(STORE, None).await.unwrap();
    let entry = repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .unwrap();
    assert!(!entry.is_dirty);
    assert!(!entry.in_sync);
    let snapshot = entry.snapshot().unwrap();
    assert_eq!(snapshot.price, Decimal::new(1000, 2));
    assert_eq!(snapshot.availability, Availability::InStock);

    // Sync pushes it upstream and marks it delivered.
    engine.sync.sync_indexed_products(STORE).await.unwrap();
    let entry = repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.in_sync);
    assert_eq!(engine.api.upserted_ids(), vec![product]);

    // Price change: dirty again, snapshot still shows the old price.
    engine.catalog.update_product(product, |p| {
        p.price = Decimal::new(1250, 2);
        p.final_price = Decimal::new(1250, 2);
    });
    engine
        .invalidation
        .invalidate_or_create(&[product], STORE)
        .await
        .unwrap();
    let entry = repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.is_dirty);
    assert_eq!(entry.snapshot().unwrap().price, Decimal::new(1000, 2));

    // Rebuild sees the difference and re-queues the push.
    engine.rebuild.rebuild_dirty_products(STORE, None).await.unwrap();
    let entry = repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .unwrap();
    assert!(!entry.is_dirty);
    assert!(!entry.in_sync);
    assert_eq!(entry.snapshot().unwrap().price, Decimal::new(1250, 2));

    engine.sync.sync_indexed_products(STORE).await.unwrap();
    let entry = repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.in_sync);
    assert_eq!(engine.api.upserted_ids(), vec![product, product]);
}

#[tokio::test]
async fn rebuilding_an_unchanged_synced_entry_is_idempotent() {
    let engine = TestEngine::new().await;
    let product = ProductId::new(1);
    engine
        .catalog
        .insert_product(simple_product(1, Decimal::new(1000, 2)));

    engine
        .invalidation
        .invalidate_or_create(&[product], STORE)
        .await
        .unwrap();
    engine.rebuild.rebuild_dirty_products(STORE, None).await.unwrap();
    engine.sync.sync_indexed_products(STORE).await.unwrap();

    let repo = IndexEntryRepository::new(&engine.pool);
    let before = repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .unwrap();
    assert!(before.in_sync);

    // Rebuild the already-clean entry directly; the catalog is unchanged.
    let after = engine
        .rebuild
        .rebuild_dirty_product(before.clone())
        .await
        .unwrap();
    assert!(after.in_sync);
    assert!(!after.is_dirty);
    assert_eq!(after.product_data, before.product_data);

    // Nothing new to sync afterwards.
    assert_eq!(repo.count_out_of_sync(STORE).await.unwrap(), 0);
}

#[tokio::test]
async fn second_sync_with_no_changes_pushes_nothing() {
    let engine = TestEngine::new().await;
    engine
        .catalog
        .insert_product(simple_product(1, Decimal::new(1000, 2)));

    engine
        .invalidation
        .invalidate_or_create(&[ProductId::new(1)], STORE)
        .await
        .unwrap();
    engine.rebuild.rebuild_dirty_products(STORE, None).await.unwrap();
    engine.sync.sync_indexed_products(STORE).await.unwrap();
    engine.sync.sync_indexed_products(STORE).await.unwrap();

    assert_eq!(engine.api.upserted_ids(), vec![ProductId::new(1)]);
}
