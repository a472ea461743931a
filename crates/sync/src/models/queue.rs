//! Update queue entries: batches of product ids awaiting asynchronous
//! fan-out to the rebuild/sync path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pelican_core::{ProductId, QueueEntryId, StoreId};

/// What the queued batch should do downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    Upsert,
    Delete,
}

impl QueueAction {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl std::str::FromStr for QueueAction {
    type Err = UnknownQueueValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(UnknownQueueValue(other.to_string())),
        }
    }
}

/// Queue entry lifecycle: `New` -> `Processing` -> `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    New,
    Processing,
    Done,
}

impl QueueStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processing => "processing",
            Self::Done => "done",
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = UnknownQueueValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            other => Err(UnknownQueueValue(other.to_string())),
        }
    }
}

/// Error for an unrecognized action/status value read from the database.
#[derive(Debug, Error)]
#[error("unknown queue value: {0}")]
pub struct UnknownQueueValue(pub String);

/// One queued batch of product ids for a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQueueEntry {
    pub id: QueueEntryId,
    pub store_id: StoreId,
    pub action: QueueAction,
    pub product_ids: Vec<ProductId>,
    pub product_id_count: i64,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_str() {
        for action in [QueueAction::Upsert, QueueAction::Delete] {
            assert_eq!(action.as_str().parse::<QueueAction>().unwrap(), action);
        }
        assert!("purge".parse::<QueueAction>().is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [QueueStatus::New, QueueStatus::Processing, QueueStatus::Done] {
            assert_eq!(status.as_str().parse::<QueueStatus>().unwrap(), status);
        }
        assert!("stuck".parse::<QueueStatus>().is_err());
    }
}
