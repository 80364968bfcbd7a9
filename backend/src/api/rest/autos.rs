use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::autos::{AssignStudentRequest, AutoRequest, AutoService, BulkAssignRequest},
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_autos).post(create_auto))
        .route("/with-students", get(list_autos_with_students))
        .route("/:id", get(get_auto).put(update_auto).delete(delete_auto))
        .route(
            "/:id/students",
            get(get_auto).post(assign_student).put(assign_students_bulk),
        )
}

async fn list_autos(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult {
    let autos = AutoService::new(state).list().await.map_err(to_response)?;
    Ok(Json(serde_json::json!({ "autos": autos })))
}

async fn list_autos_with_students(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult {
    let autos = AutoService::new(state)
        .list_with_students()
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "autos": autos })))
}

async fn get_auto(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let auto = AutoService::new(state)
        .get_with_students(id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "auto": auto })))
}

async fn create_auto(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<AutoRequest>,
) -> ApiResult {
    let auto = AutoService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "auto": auto })))
}

async fn update_auto(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AutoRequest>,
) -> ApiResult {
    let auto = AutoService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "auto": auto })))
}

async fn delete_auto(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    AutoService::new(state)
        .delete(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn assign_student(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignStudentRequest>,
) -> ApiResult {
    let mapping = AutoService::new(state)
        .assign_student(id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "mapping": mapping })))
}

async fn assign_students_bulk(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<BulkAssignRequest>,
) -> ApiResult {
    let auto = AutoService::new(state)
        .assign_students_bulk(id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "auto": auto })))
}
