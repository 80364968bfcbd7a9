use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    routing::get,
    Json, Router,
};

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::dashboard::{DashboardQuery, DashboardService},
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new().route("/fees", get(fee_summary))
}

/// `GET /api/dashboard/fees?as_of=YYYY-MM-DD`
async fn fee_summary(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<DashboardQuery>,
) -> ApiResult {
    let as_of = query.as_of_date().map_err(to_response)?;
    let report = DashboardService::new(state)
        .reconcile(as_of)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "report": report })))
}
