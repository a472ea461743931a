//! Database operations for index entries.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use pelican_core::{IndexEntryId, ProductId, StoreId};

use super::RepositoryError;
use crate::models::IndexEntry;

const COLUMNS: &str =
    "id, product_id, store_id, product_data, is_dirty, in_sync, is_deleted, created_at, updated_at";

/// Internal row type for index entry queries.
#[derive(Debug, sqlx::FromRow)]
struct IndexEntryRow {
    id: i64,
    product_id: i64,
    store_id: i64,
    product_data: Option<String>,
    is_dirty: bool,
    in_sync: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<IndexEntryRow> for IndexEntry {
    fn from(row: IndexEntryRow) -> Self {
        Self {
            id: IndexEntryId::new(row.id),
            product_id: ProductId::new(row.product_id),
            store_id: StoreId::new(row.store_id),
            product_data: row.product_data,
            is_dirty: row.is_dirty,
            in_sync: row.in_sync,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// The flag filters used by bulk scans.
#[derive(Debug, Clone, Copy)]
enum Scan {
    Dirty,
    OutOfSync,
    Deleted,
}

impl Scan {
    const fn predicate(self) -> &'static str {
        match self {
            Self::Dirty => "is_dirty = 1 AND is_deleted = 0",
            Self::OutOfSync => "in_sync = 0 AND is_deleted = 0",
            Self::Deleted => "is_deleted = 1",
        }
    }
}

/// Repository for index entry database operations.
///
/// Bulk scans return entries in no guaranteed order; callers must not
/// depend on ordering.
pub struct IndexEntryRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> IndexEntryRepository<'a> {
    /// Create a new index entry repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get an entry by surrogate key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: IndexEntryId) -> Result<Option<IndexEntry>, RepositoryError> {
        let sql = format!("SELECT {COLUMNS} FROM index_entries WHERE id = ?");
        let row = sqlx::query_as::<_, IndexEntryRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Get entries by surrogate keys; missing ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_ids(&self, ids: &[IndexEntryId]) -> Result<Vec<IndexEntry>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM index_entries WHERE id IN ("));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<IndexEntryRow> = qb.build_query_as().fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Get the entry for a (product, store) pair.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_product_and_store(
        &self,
        product_id: ProductId,
        store_id: StoreId,
    ) -> Result<Option<IndexEntry>, RepositoryError> {
        let sql =
            format!("SELECT {COLUMNS} FROM index_entries WHERE product_id = ? AND store_id = ?");
        let row = sqlx::query_as::<_, IndexEntryRow>(&sql)
            .bind(product_id)
            .bind(store_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Dirty, non-deleted entries for a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_dirty(
        &self,
        store_id: StoreId,
        product_ids: Option<&[ProductId]>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<IndexEntry>, RepositoryError> {
        self.scan(Scan::Dirty, store_id, product_ids, limit, offset).await
    }

    /// Out-of-sync, non-deleted entries for a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_out_of_sync(
        &self,
        store_id: StoreId,
        product_ids: Option<&[ProductId]>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<IndexEntry>, RepositoryError> {
        self.scan(Scan::OutOfSync, store_id, product_ids, limit, offset)
            .await
    }

    /// Soft-deleted entries for a store, awaiting purge.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_deleted(
        &self,
        store_id: StoreId,
        product_ids: Option<&[ProductId]>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<IndexEntry>, RepositoryError> {
        self.scan(Scan::Deleted, store_id, product_ids, limit, offset)
            .await
    }

    async fn scan(
        &self,
        scan: Scan,
        store_id: StoreId,
        product_ids: Option<&[ProductId]>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<IndexEntry>, RepositoryError> {
        // An explicit empty id filter matches nothing; "IN ()" is not SQL.
        if product_ids.is_some_and(<[ProductId]>::is_empty) {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM index_entries WHERE store_id = "
        ));
        qb.push_bind(store_id);
        qb.push(" AND ");
        qb.push(scan.predicate());

        if let Some(ids) = product_ids {
            qb.push(" AND product_id IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }

        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows: Vec<IndexEntryRow> = qb.build_query_as().fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Flag the (product, store) entry dirty, creating it when absent.
    ///
    /// A soft-deleted entry is resurrected: the product evidently exists
    /// again on the platform side.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_dirty_or_create(
        &self,
        product_id: ProductId,
        store_id: StoreId,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO index_entries \
             (product_id, store_id, product_data, is_dirty, in_sync, is_deleted, created_at, updated_at) \
             VALUES (?, ?, NULL, 1, 0, 0, ?, ?) \
             ON CONFLICT (product_id, store_id) \
             DO UPDATE SET is_dirty = 1, is_deleted = 0, updated_at = excluded.updated_at",
        )
        .bind(product_id)
        .bind(store_id)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Persist an entry's snapshot and flags by surrogate key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the entry no longer exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn save(&self, entry: &IndexEntry) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE index_entries \
             SET product_data = ?, is_dirty = ?, in_sync = ?, is_deleted = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(entry.product_data.as_deref())
        .bind(entry.is_dirty)
        .bind(entry.in_sync)
        .bind(entry.is_deleted)
        .bind(Utc::now())
        .bind(entry.id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Soft-delete the entries for the given products in a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_deleted(
        &self,
        product_ids: &[ProductId],
        store_id: StoreId,
    ) -> Result<u64, RepositoryError> {
        if product_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE index_entries SET is_deleted = 1, updated_at = ");
        qb.push_bind(Utc::now());
        qb.push(" WHERE store_id = ");
        qb.push_bind(store_id);
        qb.push(" AND product_id IN (");
        let mut separated = qb.separated(", ");
        for id in product_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb.build().execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Mark a batch of entries in-sync for a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_in_sync(
        &self,
        store_id: StoreId,
        entry_ids: &[IndexEntryId],
    ) -> Result<u64, RepositoryError> {
        if entry_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE index_entries SET in_sync = 1, updated_at = ");
        qb.push_bind(Utc::now());
        qb.push(" WHERE store_id = ");
        qb.push_bind(store_id);
        qb.push(" AND id IN (");
        let mut separated = qb.separated(", ");
        for id in entry_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb.build().execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Physically remove entries (the purge step after upstream deletion).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_rows(&self, entry_ids: &[IndexEntryId]) -> Result<u64, RepositoryError> {
        if entry_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM index_entries WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in entry_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb.build().execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Number of dirty, non-deleted entries for a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_dirty(&self, store_id: StoreId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM index_entries \
             WHERE store_id = ? AND is_dirty = 1 AND is_deleted = 0",
        )
        .bind(store_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Number of out-of-sync, non-deleted entries for a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_out_of_sync(&self, store_id: StoreId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM index_entries \
             WHERE store_id = ? AND in_sync = 0 AND is_deleted = 0",
        )
        .bind(store_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn mark_dirty_creates_then_updates() {
        let pool = test_pool().await;
        let repo = IndexEntryRepository::new(&pool);
        let product = ProductId::new(1);
        let store = StoreId::new(1);

        repo.mark_dirty_or_create(product, store).await.unwrap();
        let entry = repo
            .get_by_product_and_store(product, store)
            .await
            .unwrap()
            .unwrap();
        assert!(entry.is_dirty);
        assert!(!entry.in_sync);
        assert!(entry.product_data.is_none());

        // Second invalidation reuses the same row.
        repo.mark_dirty_or_create(product, store).await.unwrap();
        let again = repo
            .get_by_product_and_store(product, store)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, entry.id);
    }

    #[tokio::test]
    async fn mark_dirty_resurrects_soft_deleted_entry() {
        let pool = test_pool().await;
        let repo = IndexEntryRepository::new(&pool);
        let product = ProductId::new(2);
        let store = StoreId::new(1);

        repo.mark_dirty_or_create(product, store).await.unwrap();
        repo.mark_deleted(&[product], store).await.unwrap();
        assert_eq!(repo.list_deleted(store, None, 10, 0).await.unwrap().len(), 1);

        repo.mark_dirty_or_create(product, store).await.unwrap();
        let entry = repo
            .get_by_product_and_store(product, store)
            .await
            .unwrap()
            .unwrap();
        assert!(!entry.is_deleted);
        assert!(entry.is_dirty);
    }

    #[tokio::test]
    async fn scans_are_scoped_to_store_and_flags() {
        let pool = test_pool().await;
        let repo = IndexEntryRepository::new(&pool);

        repo.mark_dirty_or_create(ProductId::new(1), StoreId::new(1))
            .await
            .unwrap();
        repo.mark_dirty_or_create(ProductId::new(1), StoreId::new(2))
            .await
            .unwrap();

        let dirty = repo.list_dirty(StoreId::new(1), None, 10, 0).await.unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].store_id, StoreId::new(1));

        // Id-filtered scan: empty filter matches nothing.
        let none = repo
            .list_dirty(StoreId::new(1), Some(&[]), 10, 0)
            .await
            .unwrap();
        assert!(none.is_empty());

        let filtered = repo
            .list_dirty(StoreId::new(1), Some(&[ProductId::new(1)]), 10, 0)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);

        assert_eq!(repo.count_dirty(StoreId::new(1)).await.unwrap(), 1);
        assert_eq!(repo.count_out_of_sync(StoreId::new(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn save_round_trips_flags_and_data() {
        let pool = test_pool().await;
        let repo = IndexEntryRepository::new(&pool);
        let product = ProductId::new(3);
        let store = StoreId::new(1);

        repo.mark_dirty_or_create(product, store).await.unwrap();
        let mut entry = repo
            .get_by_product_and_store(product, store)
            .await
            .unwrap()
            .unwrap();

        entry.product_data = Some("{\"schema_version\":1}".to_string());
        entry.is_dirty = false;
        entry.in_sync = false;
        repo.save(&entry).await.unwrap();

        let reloaded = repo.get_by_id(entry.id).await.unwrap().unwrap();
        assert!(!reloaded.is_dirty);
        assert_eq!(reloaded.product_data.as_deref(), Some("{\"schema_version\":1}"));
    }

    #[tokio::test]
    async fn mark_in_sync_and_purge() {
        let pool = test_pool().await;
        let repo = IndexEntryRepository::new(&pool);
        let store = StoreId::new(1);

        repo.mark_dirty_or_create(ProductId::new(4), store).await.unwrap();
        repo.mark_dirty_or_create(ProductId::new(5), store).await.unwrap();
        let ids: Vec<IndexEntryId> = repo
            .list_out_of_sync(store, None, 10, 0)
            .await
            .unwrap()
            .iter()
            .map(|entry| entry.id)
            .collect();

        let updated = repo.mark_in_sync(store, &ids).await.unwrap();
        assert_eq!(updated, 2);
        assert_eq!(repo.count_out_of_sync(store).await.unwrap(), 0);

        let removed = repo.delete_rows(&ids).await.unwrap();
        assert_eq!(removed, 2);
        assert!(repo
            .get_by_product_and_store(ProductId::new(4), store)
            .await
            .unwrap()
            .is_none());
    }
}
