//! Operator-facing HTTP surface.
//!
//! Nothing here is required for correctness; the endpoints expose the
//! repository's count operations so an operator can see stuck state
//! (dirty that never clears, out-of-sync that never drains).

pub mod status;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the status router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(status::health))
        .route("/stores/{store_id}/status", get(status::store_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
