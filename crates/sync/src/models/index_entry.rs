//! The index entry: the per-(product, store) durable cache record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pelican_core::{IndexEntryId, ProductId, StoreId};

use super::snapshot::{ProductSnapshot, SnapshotEnvelope};

/// A per-(product, store) record holding the last-built snapshot plus the
/// dirty / in-sync flags that drive the rebuild and sync pipelines.
///
/// At most one live (non-deleted) entry exists per (product, store) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Surrogate key, assigned on creation.
    pub id: IndexEntryId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    /// Serialized snapshot envelope; `None` until first build, or when
    /// invalidation created the entry reactively.
    pub product_data: Option<String>,
    /// The stored snapshot may be stale and must be rebuilt before being
    /// trusted for upstream sync.
    pub is_dirty: bool,
    /// The stored snapshot is believed to match what the recommendation API
    /// currently holds.
    pub in_sync: bool,
    /// Soft-delete marker; distinct from the physical purge.
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexEntry {
    /// Decode the stored snapshot, if any.
    ///
    /// A missing, corrupt, or version-mismatched blob decodes to `None`;
    /// the rebuild path treats that as "differs from the fresh build".
    #[must_use]
    pub fn snapshot(&self) -> Option<ProductSnapshot> {
        self.product_data
            .as_deref()
            .and_then(SnapshotEnvelope::decode)
    }
}
