use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};
use tracing::warn;

use crate::infrastructure::state::AppState;

/// Liveness plus a round trip to the database.
pub async fn healthcheck(
    Extension(state): Extension<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "database": "ok" })),
        ),
        Err(err) => {
            warn!(error = ?err, "health check could not reach the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded", "database": "unreachable" })),
            )
        }
    }
}
