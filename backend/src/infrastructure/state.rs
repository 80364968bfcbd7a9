use std::sync::Arc;

use crate::{
    domain::models::User,
    infrastructure::{
        auth::{AuthenticatedUser, JwtKeys},
        config::Config,
        db::PgPool,
    },
    services::errors::ServiceError,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub jwt_keys: JwtKeys,
}

impl AppState {
    pub fn new(config: Arc<Config>, pool: PgPool) -> Self {
        let jwt_keys = JwtKeys::new(&config.auth.jwt_secret);
        Self {
            config,
            pool,
            jwt_keys,
        }
    }

    /// Resolves the configured development user when auth bypass is on.
    pub async fn resolve_bypass_user(&self) -> Result<Option<AuthenticatedUser>, ServiceError> {
        if !self.config.auth.bypass_auth {
            return Ok(None);
        }
        let Some(email) = self.config.auth.bypass_email.as_deref() else {
            return Ok(None);
        };

        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, full_name, role, is_active, created_at
             FROM users WHERE email = $1 AND is_active",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user.map(|user| AuthenticatedUser {
            user_id: user.id,
            role: user.role,
        }))
    }
}
