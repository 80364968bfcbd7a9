use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::fee_payments::{
        CreatePaymentRequest, FeePaymentService, PaymentFilter, UpdatePaymentRequest,
    },
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_payments).post(create_payment))
        .route("/:id", get(get_payment).put(update_payment).delete(delete_payment))
}

async fn list_payments(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(filter): Query<PaymentFilter>,
) -> ApiResult {
    let payments = FeePaymentService::new(state)
        .list(filter)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "fee_payments": payments })))
}

async fn get_payment(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let payment = FeePaymentService::new(state)
        .get(id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "fee_payment": payment })))
}

async fn create_payment(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> ApiResult {
    let payment = FeePaymentService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "fee_payment": payment })))
}

async fn update_payment(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePaymentRequest>,
) -> ApiResult {
    let payment = FeePaymentService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "fee_payment": payment })))
}

async fn delete_payment(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    FeePaymentService::new(state)
        .delete(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
