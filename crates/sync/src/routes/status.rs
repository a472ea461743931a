//! Health and per-store status handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use tracing::error;

use pelican_core::StoreId;

use crate::db::IndexEntryRepository;
use crate::state::AppState;

/// Counts an operator watches to spot a stuck pipeline.
#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub store_id: StoreId,
    pub dirty: i64,
    pub out_of_sync: i64,
}

/// Liveness probe.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Dirty / out-of-sync counts for one store.
pub async fn store_status(
    State(state): State<AppState>,
    Path(store_id): Path<i64>,
) -> Result<Json<StoreStatus>, StatusCode> {
    let store_id = StoreId::new(store_id);
    let repo = IndexEntryRepository::new(&state.pool);

    let dirty = repo.count_dirty(store_id).await.map_err(|err| {
        error!(%store_id, error = %err, "Failed to count dirty entries");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let out_of_sync = repo.count_out_of_sync(store_id).await.map_err(|err| {
        error!(%store_id, error = %err, "Failed to count out-of-sync entries");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(StoreStatus {
        store_id,
        dirty,
        out_of_sync,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use pelican_core::ProductId;

    use crate::db::test_pool;
    use crate::routes::router;

    use super::*;

    #[tokio::test]
    async fn health_answers_ok() {
        let state = AppState::new(test_pool().await);
        let response = router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn store_status_reports_counts() {
        let pool = test_pool().await;
        let repo = IndexEntryRepository::new(&pool);
        repo.mark_dirty_or_create(ProductId::new(1), StoreId::new(7))
            .await
            .unwrap();

        let response = router(AppState::new(pool))
            .oneshot(
                Request::builder()
                    .uri("/stores/7/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status["dirty"], 1);
        assert_eq!(status["out_of_sync"], 1);
    }
}
