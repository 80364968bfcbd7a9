use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::students::{
        CreateStudentRequest, DayBoardingFilter, StudentFilter, StudentService,
        UpdateStudentRequest,
    },
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_students).post(create_student))
        .route("/day-boarding", get(day_boarding_students))
        .route("/:id", get(get_student).put(update_student).delete(delete_student))
        .route("/:id/drop-out", post(drop_out_student))
        .route("/:id/day-boarding-history", get(day_boarding_history))
}

async fn list_students(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(filter): Query<StudentFilter>,
) -> ApiResult {
    let students = StudentService::new(state)
        .list(filter)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "students": students })))
}

async fn get_student(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let student = StudentService::new(state)
        .get(id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "student": student })))
}

async fn create_student(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateStudentRequest>,
) -> ApiResult {
    let student = StudentService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "student": student })))
}

async fn update_student(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStudentRequest>,
) -> ApiResult {
    let student = StudentService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "student": student })))
}

async fn delete_student(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    StudentService::new(state)
        .delete(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn drop_out_student(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let student = StudentService::new(state)
        .drop_out(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "student": student })))
}

async fn day_boarding_students(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(filter): Query<DayBoardingFilter>,
) -> ApiResult {
    let students = StudentService::new(state)
        .day_boarding_students(filter)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "students": students })))
}

async fn day_boarding_history(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let service = StudentService::new(state);
    service.get(id).await.map_err(to_response)?;
    let history = service.history(id).await.map_err(to_response)?;
    Ok(Json(serde_json::json!({ "history": history })))
}
