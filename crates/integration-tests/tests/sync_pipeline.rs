//! Pipeline properties: parent redirection, batch completeness under API
//! failure, deletion purge, and the queue fan-out path.

use std::sync::Arc;

use rust_decimal::Decimal;

use pelican_core::ProductId;
use pelican_integration_tests::{RecordingApi, STORE, TestEngine, simple_product};
use pelican_sync::catalog::ProductType;
use pelican_sync::db::IndexEntryRepository;
use pelican_sync::models::QueueAction;
use pelican_sync::services::{
    ChannelDispatcher, QueueProcessor, QueuePublisher, TaskConsumer,
};

#[tokio::test]
async fn child_invalidation_lands_on_the_parent_entry() {
    let engine = TestEngine::new().await;

    let mut parent = simple_product(10, Decimal::new(2000, 2));
    parent.product_type = ProductType::Configurable;
    parent.children = vec![ProductId::new(11)];
    engine.catalog.insert_product(parent);
    engine
        .catalog
        .insert_product(simple_product(11, Decimal::new(2000, 2)));

    engine
        .invalidation
        .invalidate_or_create(&[ProductId::new(11)], STORE)
        .await
        .unwrap();

    let repo = IndexEntryRepository::new(&engine.pool);
    let parent_entry = repo
        .get_by_product_and_store(ProductId::new(10), STORE)
        .await
        .unwrap();
    assert!(parent_entry.unwrap().is_dirty);
    assert!(repo
        .get_by_product_and_store(ProductId::new(11), STORE)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn every_entry_is_marked_in_sync_even_when_one_batch_fails() {
    // Batch size is 50; 120 entries make three batches. Fail the second.
    let engine = TestEngine::with_api(RecordingApi {
        failing_upsert_calls: vec![1],
        ..RecordingApi::default()
    })
    .await;

    let ids: Vec<ProductId> = (1..=120)
        .map(|i| {
            engine
                .catalog
                .insert_product(simple_product(i, Decimal::new(999, 2)));
            ProductId::new(i)
        })
        .collect();

    engine
        .invalidation
        .invalidate_or_create(&ids, STORE)
        .await
        .unwrap();
    engine.rebuild.rebuild_dirty_products(STORE, None).await.unwrap();
    let marked = engine.sync.sync_indexed_products(STORE).await.unwrap();

    assert_eq!(marked, 120);
    let repo = IndexEntryRepository::new(&engine.pool);
    assert_eq!(repo.count_out_of_sync(STORE).await.unwrap(), 0);
    assert_eq!(engine.api.upsert_batches.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn purged_entries_disappear_from_lookups_only_after_the_delete_batch() {
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

    // The product disappears platform-side; the diff pass flags it.
    engine.catalog.remove_product(product);
    engine
        .invalidation
        .mark_deleted_by_diff(&[], &[product], STORE)
        .await
        .unwrap();

    // Flagged but not yet purged: the row still exists.
    let repo = IndexEntryRepository::new(&engine.pool);
    assert!(repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .unwrap()
        .is_deleted);
    assert!(engine.api.delete_batches.lock().unwrap().is_empty());

    engine.sync.purge_deleted_products(STORE).await.unwrap();

    // The delete operation went out and the row is gone for good.
    assert_eq!(
        engine.api.delete_batches.lock().unwrap().as_slice(),
        &[vec![product]]
    );
    assert!(repo
        .get_by_product_and_store(product, STORE)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn queue_fan_out_drives_the_pipeline_end_to_end() {
    let engine = TestEngine::new().await;
    for i in 1..=5 {
        engine
            .catalog
            .insert_product(simple_product(i, Decimal::new(500, 2)));
    }
    let ids: Vec<ProductId> = (1..=5).map(ProductId::new).collect();

    let (dispatcher, mut tasks) = ChannelDispatcher::channel();
    let processor = QueueProcessor::new(
        engine.pool.clone(),
        QueuePublisher::new(Arc::new(dispatcher), 2),
    );

    // Request path: two overlapping enqueues, merged on processing.
    processor
        .enqueue(STORE, QueueAction::Upsert, &ids[..3])
        .await
        .unwrap();
    processor
        .enqueue(STORE, QueueAction::Upsert, &ids[2..])
        .await
        .unwrap();
    processor.process(STORE).await.unwrap();

    // Worker path: drain the dispatched chunks through the consumer.
    let consumer = TaskConsumer::new(
        Arc::clone(&engine.invalidation),
        Arc::clone(&engine.rebuild),
        Arc::clone(&engine.sync),
    );
    while let Ok(task) = tasks.try_recv() {
        consumer.handle(task).await.unwrap();
    }

    let repo = IndexEntryRepository::new(&engine.pool);
    assert_eq!(repo.count_dirty(STORE).await.unwrap(), 0);
    assert_eq!(repo.count_out_of_sync(STORE).await.unwrap(), 0);

    // Every product was pushed exactly once despite the overlap.
    let mut pushed = engine.api.upserted_ids();
    pushed.sort_unstable();
    assert_eq!(pushed, ids);
}
