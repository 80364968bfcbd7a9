use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::models::SchoolClass,
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::{non_blank, validate_payload},
};

use super::errors::ServiceError;

const CLASS_COLUMNS: &str = "id, name, academic_year_id, status, created_at, updated_at";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub academic_year_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClassRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub academic_year_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ClassFilter {
    pub academic_year_id: Option<Uuid>,
}

pub struct ClassService {
    state: Arc<AppState>,
}

impl ClassService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn list(&self, filter: ClassFilter) -> Result<Vec<SchoolClass>, ServiceError> {
        let classes = sqlx::query_as::<_, SchoolClass>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes
             WHERE ($1::uuid IS NULL OR academic_year_id = $1)
             ORDER BY name ASC, id ASC"
        ))
        .bind(filter.academic_year_id)
        .fetch_all(&self.state.pool)
        .await?;
        Ok(classes)
    }

    pub async fn get(&self, class_id: Uuid) -> Result<SchoolClass, ServiceError> {
        sqlx::query_as::<_, SchoolClass>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"
        ))
        .bind(class_id)
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("class"))
    }

    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        payload: CreateClassRequest,
    ) -> Result<SchoolClass, ServiceError> {
        validate_payload(&payload)?;
        let name = non_blank("name", &payload.name)?;
        self.ensure_year_exists(payload.academic_year_id).await?;
        self.ensure_unique(&name, payload.academic_year_id, None).await?;

        let now = Utc::now();
        let class = sqlx::query_as::<_, SchoolClass>(&format!(
            "INSERT INTO classes
                 (id, name, academic_year_id, created_by, updated_by, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$4,$5,$5)
             RETURNING {CLASS_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(payload.academic_year_id)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&self.state.pool)
        .await?;
        Ok(class)
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        class_id: Uuid,
        payload: UpdateClassRequest,
    ) -> Result<SchoolClass, ServiceError> {
        validate_payload(&payload)?;
        let current = self.get(class_id).await?;

        let name = match payload.name.as_deref() {
            Some(name) => non_blank("name", name)?,
            None => current.name.clone(),
        };
        let academic_year_id = payload.academic_year_id.unwrap_or(current.academic_year_id);
        if payload.academic_year_id.is_some() {
            self.ensure_year_exists(academic_year_id).await?;
        }
        self.ensure_unique(&name, academic_year_id, Some(class_id)).await?;

        let class = sqlx::query_as::<_, SchoolClass>(&format!(
            "UPDATE classes SET name = $1, academic_year_id = $2, updated_by = $3, updated_at = $4
             WHERE id = $5
             RETURNING {CLASS_COLUMNS}"
        ))
        .bind(&name)
        .bind(academic_year_id)
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(class_id)
        .fetch_one(&self.state.pool)
        .await?;
        Ok(class)
    }

    pub async fn delete(
        &self,
        actor: &AuthenticatedUser,
        class_id: Uuid,
    ) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let references = sqlx::query_scalar::<_, i64>(
            "SELECT (SELECT COUNT(1) FROM sections WHERE class_id = $1)
                  + (SELECT COUNT(1) FROM students WHERE class_id = $1)",
        )
        .bind(class_id)
        .fetch_one(&self.state.pool)
        .await?;
        if references > 0 {
            return Err(ServiceError::Conflict(
                "class is referenced by sections or students".into(),
            ));
        }

        let result = sqlx::query("DELETE FROM classes WHERE id = $1")
            .bind(class_id)
            .execute(&self.state.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("class"));
        }
        Ok(())
    }

    async fn ensure_year_exists(&self, academic_year_id: Uuid) -> Result<(), ServiceError> {
        let exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM academic_years WHERE id = $1")
                .bind(academic_year_id)
                .fetch_one(&self.state.pool)
                .await?;
        if exists == 0 {
            return Err(ServiceError::Validation(format!(
                "academic year with id {academic_year_id} does not exist"
            )));
        }
        Ok(())
    }

    async fn ensure_unique(
        &self,
        name: &str,
        academic_year_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let clash = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(1) FROM classes
             WHERE name = $1 AND academic_year_id = $2 AND ($3::uuid IS NULL OR id <> $3)",
        )
        .bind(name)
        .bind(academic_year_id)
        .bind(exclude)
        .fetch_one(&self.state.pool)
        .await?;
        if clash > 0 {
            return Err(ServiceError::Conflict(format!(
                "class '{name}' already exists in this academic year"
            )));
        }
        Ok(())
    }
}
