use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::{
        classes::{ClassFilter, ClassService, CreateClassRequest, UpdateClassRequest},
        sections::SectionService,
        students::StudentService,
    },
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_classes).post(create_class))
        .route("/:id", get(get_class).put(update_class).delete(delete_class))
        .route("/:id/sections", get(class_sections))
        .route("/:id/students", get(class_students))
}

async fn list_classes(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(filter): Query<ClassFilter>,
) -> ApiResult {
    let classes = ClassService::new(state)
        .list(filter)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "classes": classes })))
}

async fn get_class(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let class = ClassService::new(state).get(id).await.map_err(to_response)?;
    Ok(Json(serde_json::json!({ "class": class })))
}

async fn create_class(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateClassRequest>,
) -> ApiResult {
    let class = ClassService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "class": class })))
}

async fn update_class(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateClassRequest>,
) -> ApiResult {
    let class = ClassService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "class": class })))
}

async fn delete_class(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    ClassService::new(state)
        .delete(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn class_sections(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let sections = SectionService::new(state)
        .list_by_class(id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "sections": sections })))
}

async fn class_students(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let students = StudentService::new(state)
        .by_class(id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "students": students })))
}
