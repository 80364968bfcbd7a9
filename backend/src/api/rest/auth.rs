use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    domain::models::{Role, User},
    infrastructure::{
        auth::{credential_matches, issue_token},
        state::AppState,
    },
    services::errors::ServiceError,
};

use super::to_response;

pub fn router() -> Router {
    Router::new().route("/login", post(login))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    credential: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    role: Role,
    full_name: Option<String>,
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<serde_json::Value>)> {
    if !credential_matches(&state.config.auth.developer_credential, &payload.credential) {
        return Err(unauthorized());
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, full_name, role, is_active, created_at
        FROM users
        WHERE lower(email) = lower($1) AND is_active
        "#,
    )
    .bind(payload.email.trim())
    .fetch_optional(&state.pool)
    .await
    .map_err(|err| to_response(ServiceError::Internal(err.to_string())))?;

    let Some(user) = user else {
        return Err(unauthorized());
    };

    let token = issue_token(&state, &user).map_err(to_response)?;
    info!(user_id = %user.id, "user logged in");

    Ok(Json(LoginResponse {
        token,
        role: user.role,
        full_name: user.full_name,
    }))
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "invalid_credentials" })),
    )
}
