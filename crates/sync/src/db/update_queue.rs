//! Database operations for the update queue.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use pelican_core::{ProductId, QueueEntryId, StoreId};

use super::RepositoryError;
use crate::models::{QueueAction, QueueStatus, UpdateQueueEntry};

const COLUMNS: &str = "id, store_id, action, product_ids, product_id_count, status, \
                       created_at, started_at, completed_at";

/// Internal row type for queue queries.
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: i64,
    store_id: i64,
    action: String,
    product_ids: String,
    product_id_count: i64,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueueRow> for UpdateQueueEntry {
    type Error = RepositoryError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let action: QueueAction = row
            .action
            .parse()
            .map_err(|e| RepositoryError::DataCorruption(format!("queue action: {e}")))?;
        let status: QueueStatus = row
            .status
            .parse()
            .map_err(|e| RepositoryError::DataCorruption(format!("queue status: {e}")))?;
        let product_ids: Vec<ProductId> = serde_json::from_str(&row.product_ids)
            .map_err(|e| RepositoryError::DataCorruption(format!("queue product ids: {e}")))?;

        Ok(Self {
            id: QueueEntryId::new(row.id),
            store_id: StoreId::new(row.store_id),
            action,
            product_ids,
            product_id_count: row.product_id_count,
            status,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Repository for update queue database operations.
pub struct UpdateQueueRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UpdateQueueRepository<'a> {
    /// Create a new update queue repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a new queue entry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn enqueue(
        &self,
        store_id: StoreId,
        action: QueueAction,
        product_ids: &[ProductId],
    ) -> Result<UpdateQueueEntry, RepositoryError> {
        let serialized = serde_json::to_string(product_ids)
            .map_err(|e| RepositoryError::DataCorruption(format!("queue product ids: {e}")))?;
        let count = i64::try_from(product_ids.len())
            .map_err(|e| RepositoryError::DataCorruption(format!("queue size: {e}")))?;

        let sql = format!(
            "INSERT INTO update_queue \
             (store_id, action, product_ids, product_id_count, status, created_at) \
             VALUES (?, ?, ?, ?, 'new', ?) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(store_id)
            .bind(action.as_str())
            .bind(serialized)
            .bind(count)
            .bind(Utc::now())
            .fetch_one(self.pool)
            .await?;

        row.try_into()
    }

    /// Claim every `new` entry for a store, marking them `processing`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn claim_new(
        &self,
        store_id: StoreId,
    ) -> Result<Vec<UpdateQueueEntry>, RepositoryError> {
        let sql = format!(
            "UPDATE update_queue SET status = 'processing', started_at = ? \
             WHERE store_id = ? AND status = 'new' \
             RETURNING {COLUMNS}"
        );
        let rows: Vec<QueueRow> = sqlx::query_as(&sql)
            .bind(Utc::now())
            .bind(store_id)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Mark claimed entries as done.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_done(&self, entry_ids: &[QueueEntryId]) -> Result<u64, RepositoryError> {
        if entry_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE update_queue SET status = 'done', completed_at = ");
        qb.push_bind(Utc::now());
        qb.push(" WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in entry_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb.build().execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Get a queue entry by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(
        &self,
        id: QueueEntryId,
    ) -> Result<Option<UpdateQueueEntry>, RepositoryError> {
        let sql = format!("SELECT {COLUMNS} FROM update_queue WHERE id = ?");
        let row: Option<QueueRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn enqueue_claim_done_lifecycle() {
        let pool = test_pool().await;
        let repo = UpdateQueueRepository::new(&pool);
        let store = StoreId::new(1);
        let ids = [ProductId::new(1), ProductId::new(2)];

        let entry = repo.enqueue(store, QueueAction::Upsert, &ids).await.unwrap();
        assert_eq!(entry.status, QueueStatus::New);
        assert_eq!(entry.product_id_count, 2);
        assert!(entry.started_at.is_none());

        let claimed = repo.claim_new(store).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, QueueStatus::Processing);
        assert!(claimed[0].started_at.is_some());
        assert_eq!(claimed[0].product_ids, ids);

        // Nothing left to claim.
        assert!(repo.claim_new(store).await.unwrap().is_empty());

        repo.mark_done(&[entry.id]).await.unwrap();
        let done = repo.get_by_id(entry.id).await.unwrap().unwrap();
        assert_eq!(done.status, QueueStatus::Done);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn claims_are_scoped_per_store() {
        let pool = test_pool().await;
        let repo = UpdateQueueRepository::new(&pool);

        repo.enqueue(StoreId::new(1), QueueAction::Upsert, &[ProductId::new(1)])
            .await
            .unwrap();
        repo.enqueue(StoreId::new(2), QueueAction::Delete, &[ProductId::new(2)])
            .await
            .unwrap();

        let claimed = repo.claim_new(StoreId::new(1)).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].store_id, StoreId::new(1));
        assert_eq!(claimed[0].action, QueueAction::Upsert);
    }
}
