use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::models::Section,
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::{non_blank, validate_payload},
};

use super::errors::ServiceError;

const SECTION_COLUMNS: &str = "id, name, class_id, status, created_at, updated_at";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSectionRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    pub class_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSectionRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    pub class_id: Option<Uuid>,
}

pub struct SectionService {
    state: Arc<AppState>,
}

impl SectionService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn list(&self) -> Result<Vec<Section>, ServiceError> {
        let sections = sqlx::query_as::<_, Section>(&format!(
            "SELECT {SECTION_COLUMNS} FROM sections ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&self.state.pool)
        .await?;
        Ok(sections)
    }

    pub async fn list_by_class(&self, class_id: Uuid) -> Result<Vec<Section>, ServiceError> {
        if !self.class_exists(class_id).await? {
            return Err(ServiceError::NotFound(format!(
                "class with id {class_id} not found"
            )));
        }
        let sections = sqlx::query_as::<_, Section>(&format!(
            "SELECT {SECTION_COLUMNS} FROM sections WHERE class_id = $1 ORDER BY name ASC"
        ))
        .bind(class_id)
        .fetch_all(&self.state.pool)
        .await?;
        Ok(sections)
    }

    pub async fn get(&self, section_id: Uuid) -> Result<Section, ServiceError> {
        sqlx::query_as::<_, Section>(&format!(
            "SELECT {SECTION_COLUMNS} FROM sections WHERE id = $1"
        ))
        .bind(section_id)
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("section"))
    }

    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        payload: CreateSectionRequest,
    ) -> Result<Section, ServiceError> {
        validate_payload(&payload)?;
        let name = non_blank("name", &payload.name)?;
        if !self.class_exists(payload.class_id).await? {
            return Err(invalid_class(payload.class_id));
        }
        self.ensure_unique(&name, payload.class_id, None).await?;

        let now = Utc::now();
        let section = sqlx::query_as::<_, Section>(&format!(
            "INSERT INTO sections
                 (id, name, class_id, created_by, updated_by, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$4,$5,$5)
             RETURNING {SECTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(payload.class_id)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&self.state.pool)
        .await?;
        Ok(section)
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        section_id: Uuid,
        payload: UpdateSectionRequest,
    ) -> Result<Section, ServiceError> {
        validate_payload(&payload)?;
        let current = self.get(section_id).await?;

        let name = match payload.name.as_deref() {
            Some(name) => non_blank("name", name)?,
            None => current.name.clone(),
        };
        let class_id = payload.class_id.unwrap_or(current.class_id);
        if payload.class_id.is_some() && !self.class_exists(class_id).await? {
            return Err(invalid_class(class_id));
        }
        self.ensure_unique(&name, class_id, Some(section_id)).await?;

        let section = sqlx::query_as::<_, Section>(&format!(
            "UPDATE sections SET name = $1, class_id = $2, updated_by = $3, updated_at = $4
             WHERE id = $5
             RETURNING {SECTION_COLUMNS}"
        ))
        .bind(&name)
        .bind(class_id)
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(section_id)
        .fetch_one(&self.state.pool)
        .await?;
        Ok(section)
    }

    pub async fn delete(
        &self,
        actor: &AuthenticatedUser,
        section_id: Uuid,
    ) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let students =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM students WHERE section_id = $1")
                .bind(section_id)
                .fetch_one(&self.state.pool)
                .await?;
        if students > 0 {
            return Err(ServiceError::Conflict(
                "section still has students assigned".into(),
            ));
        }

        let result = sqlx::query("DELETE FROM sections WHERE id = $1")
            .bind(section_id)
            .execute(&self.state.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("section"));
        }
        Ok(())
    }

    async fn class_exists(&self, class_id: Uuid) -> Result<bool, ServiceError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM classes WHERE id = $1")
            .bind(class_id)
            .fetch_one(&self.state.pool)
            .await?;
        Ok(count > 0)
    }

    async fn ensure_unique(
        &self,
        name: &str,
        class_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let clash = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(1) FROM sections
             WHERE name = $1 AND class_id = $2 AND ($3::uuid IS NULL OR id <> $3)",
        )
        .bind(name)
        .bind(class_id)
        .bind(exclude)
        .fetch_one(&self.state.pool)
        .await?;
        if clash > 0 {
            return Err(ServiceError::Conflict(format!(
                "section '{name}' already exists in this class"
            )));
        }
        Ok(())
    }
}

fn invalid_class(class_id: Uuid) -> ServiceError {
    ServiceError::Validation(format!("class with id {class_id} does not exist"))
}
