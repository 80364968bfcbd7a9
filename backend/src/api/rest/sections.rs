use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::{
        sections::{CreateSectionRequest, SectionService, UpdateSectionRequest},
        students::StudentService,
    },
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sections).post(create_section))
        .route("/by-class/:class_id", get(sections_by_class))
        .route("/:id", get(get_section).put(update_section).delete(delete_section))
        .route("/:id/students", get(section_students))
}

async fn list_sections(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult {
    let sections = SectionService::new(state)
        .list()
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "sections": sections })))
}

async fn sections_by_class(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(class_id): Path<Uuid>,
) -> ApiResult {
    let sections = SectionService::new(state)
        .list_by_class(class_id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "sections": sections })))
}

async fn get_section(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let section = SectionService::new(state)
        .get(id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "section": section })))
}

async fn create_section(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateSectionRequest>,
) -> ApiResult {
    let section = SectionService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "section": section })))
}

async fn update_section(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSectionRequest>,
) -> ApiResult {
    let section = SectionService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "section": section })))
}

async fn delete_section(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    SectionService::new(state)
        .delete(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn section_students(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let students = StudentService::new(state)
        .by_section(id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "students": students })))
}
