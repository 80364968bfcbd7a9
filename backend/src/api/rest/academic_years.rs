use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::academic_years::{AcademicYearService, CreateYearRequest, UpdateYearRequest},
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_years).post(create_year))
        .route("/active", get(active_year))
        .route("/:id", get(get_year).put(update_year).delete(delete_year))
        .route("/:id/activate", post(activate_year))
        .route("/:id/deactivate", post(deactivate_year))
}

async fn list_years(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult {
    let years = AcademicYearService::new(state)
        .list()
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "academic_years": years })))
}

async fn active_year(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult {
    let year = AcademicYearService::new(state)
        .active()
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "academic_year": year })))
}

async fn get_year(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let year = AcademicYearService::new(state)
        .get(id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "academic_year": year })))
}

async fn create_year(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateYearRequest>,
) -> ApiResult {
    let year = AcademicYearService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "academic_year": year })))
}

async fn update_year(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateYearRequest>,
) -> ApiResult {
    let year = AcademicYearService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "academic_year": year })))
}

async fn delete_year(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    AcademicYearService::new(state)
        .delete(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn activate_year(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let year = AcademicYearService::new(state)
        .activate(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "academic_year": year })))
}

async fn deactivate_year(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let year = AcademicYearService::new(state)
        .deactivate(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "academic_year": year })))
}
