use axum::{http::StatusCode, routing::get, Json, Router};

use crate::services::errors::ServiceError;

pub mod academic_years;
pub mod auth;
pub mod autos;
pub mod classes;
pub mod dashboard;
pub mod fee_payments;
pub mod health;
pub mod sections;
pub mod students;

pub type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::healthcheck))
        .nest("/auth", auth::router())
        .nest("/academic-years", academic_years::router())
        .nest("/classes", classes::router())
        .nest("/sections", sections::router())
        .nest("/students", students::router())
        .nest("/fee-payments", fee_payments::router())
        .nest("/dashboard", dashboard::router())
        .nest("/autos", autos::router())
}

pub(crate) fn to_response(err: ServiceError) -> (StatusCode, Json<serde_json::Value>) {
    (
        err.status_code(),
        Json(serde_json::json!({ "error": err.to_string() })),
    )
}
