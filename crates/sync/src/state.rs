//! Shared state for the status endpoint.

use sqlx::SqlitePool;

/// State handed to the axum router.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Index store connection pool.
    pub pool: SqlitePool,
}

impl AppState {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}
