//! Unified error handling for the sync engine.
//!
//! Batch loops isolate per-item failures (logged and skipped); the variants
//! here are the ones that cross a service boundary. [`SyncError::MemoryOutOfBounds`]
//! is always fatal for the run that raises it; [`SyncError::AccountNotFound`]
//! aborts one store's sync while other stores continue.

use thiserror::Error;

use pelican_core::StoreId;

use crate::api::ApiError;
use crate::catalog::CatalogError;
use crate::db::RepositoryError;
use crate::instrument::MemoryOutOfBounds;
use crate::services::queue::DispatchError;

/// Service-level error type for the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Index store operation failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Catalog backend failed to answer; structural for the current call.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Recommendation API client could not be used at all (construction,
    /// payload). Call-time API failures are logged, not raised.
    #[error("recommendation api error: {0}")]
    Api(#[from] ApiError),

    /// No merchant account is linked to the store.
    #[error("no account linked to store {0}")]
    AccountNotFound(StoreId),

    /// The batch crossed the configured memory bound.
    #[error(transparent)]
    MemoryOutOfBounds(#[from] MemoryOutOfBounds),

    /// The asynchronous task executor refused the work.
    #[error("task dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl SyncError {
    /// Whether this error must abort the whole batch/cron run rather than
    /// just the current store.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::MemoryOutOfBounds(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_memory_guard_is_fatal() {
        assert!(SyncError::MemoryOutOfBounds(MemoryOutOfBounds {
            used_mb: 900,
            allowed_mb: 800,
        })
        .is_fatal());
        assert!(!SyncError::AccountNotFound(StoreId::new(1)).is_fatal());
        assert!(!SyncError::Repository(RepositoryError::NotFound).is_fatal());
    }
}
