//! Academic year management and the single-active-year guard.
//!
//! Backs the `/academic-years` routes. At most one year may be active; the
//! guard below changes active flags only inside a transaction that holds a
//! table lock, and a partial unique index enforces the same rule in storage.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use sqlx::{Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::{academic_year::normalize_year_label, models::AcademicYear},
    infrastructure::{auth::AuthenticatedUser, state::AppState},
};

use super::errors::ServiceError;

const YEAR_COLUMNS: &str = "id, year, is_active, status, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateYearRequest {
    pub year: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateYearRequest {
    pub year: Option<String>,
}

pub struct AcademicYearService {
    state: Arc<AppState>,
}

impl AcademicYearService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn list(&self) -> Result<Vec<AcademicYear>, ServiceError> {
        let years = sqlx::query_as::<_, AcademicYear>(&format!(
            "SELECT {YEAR_COLUMNS} FROM academic_years ORDER BY year ASC"
        ))
        .fetch_all(&self.state.pool)
        .await?;
        Ok(years)
    }

    pub async fn get(&self, year_id: Uuid) -> Result<AcademicYear, ServiceError> {
        sqlx::query_as::<_, AcademicYear>(&format!(
            "SELECT {YEAR_COLUMNS} FROM academic_years WHERE id = $1"
        ))
        .bind(year_id)
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("academic year"))
    }

    pub async fn active(&self) -> Result<AcademicYear, ServiceError> {
        sqlx::query_as::<_, AcademicYear>(&format!(
            "SELECT {YEAR_COLUMNS} FROM academic_years WHERE is_active"
        ))
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("no active academic year".into()))
    }

    /// Creates an inactive year. Activation is always a separate, explicit
    /// call.
    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        payload: CreateYearRequest,
    ) -> Result<AcademicYear, ServiceError> {
        let label = normalize_year_label(&payload.year).map_err(ServiceError::Validation)?;

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(1) FROM academic_years WHERE year = $1",
        )
        .bind(&label)
        .fetch_one(&self.state.pool)
        .await?;
        if existing > 0 {
            return Err(duplicate_label(&label));
        }

        let now = Utc::now();
        let year = sqlx::query_as::<_, AcademicYear>(&format!(
            "INSERT INTO academic_years
                 (id, year, is_active, created_by, updated_by, created_at, updated_at)
             VALUES ($1,$2,FALSE,$3,$3,$4,$4)
             RETURNING {YEAR_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&label)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&self.state.pool)
        .await
        .map_err(|err| match ServiceError::from(err) {
            ServiceError::Conflict(_) => duplicate_label(&label),
            other => other,
        })?;

        info!(year_id = %year.id, year = %year.year, "academic year created");
        Ok(year)
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        year_id: Uuid,
        payload: UpdateYearRequest,
    ) -> Result<AcademicYear, ServiceError> {
        let current = self.get(year_id).await?;
        let Some(raw) = payload.year else {
            return Ok(current);
        };
        let label = normalize_year_label(&raw).map_err(ServiceError::Validation)?;

        if label != current.year {
            let clash = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(1) FROM academic_years WHERE year = $1 AND id <> $2",
            )
            .bind(&label)
            .bind(year_id)
            .fetch_one(&self.state.pool)
            .await?;
            if clash > 0 {
                return Err(duplicate_label(&label));
            }
        }

        let year = sqlx::query_as::<_, AcademicYear>(&format!(
            "UPDATE academic_years SET year = $1, updated_by = $2, updated_at = $3
             WHERE id = $4
             RETURNING {YEAR_COLUMNS}"
        ))
        .bind(&label)
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(year_id)
        .fetch_optional(&self.state.pool)
        .await
        .map_err(|err| match ServiceError::from(err) {
            ServiceError::Conflict(_) => duplicate_label(&label),
            other => other,
        })?
        .ok_or_else(|| ServiceError::not_found("academic year"))?;
        Ok(year)
    }

    pub async fn delete(
        &self,
        actor: &AuthenticatedUser,
        year_id: Uuid,
    ) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let mut tx = self.state.pool.begin().await?;

        let references = sqlx::query_scalar::<_, i64>(
            "SELECT (SELECT COUNT(1) FROM classes WHERE academic_year_id = $1)
                  + (SELECT COUNT(1) FROM students WHERE academic_year_id = $1)",
        )
        .bind(year_id)
        .fetch_one(&mut *tx)
        .await?;
        if references > 0 {
            return Err(ServiceError::Conflict(
                "academic year is referenced by classes or students".into(),
            ));
        }

        let result = sqlx::query("DELETE FROM academic_years WHERE id = $1")
            .bind(year_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("academic year"));
        }
        tx.commit().await?;

        info!(year_id = %year_id, "academic year deleted");
        Ok(())
    }

    /// Makes `year_id` the only active year.
    pub async fn activate(
        &self,
        actor: &AuthenticatedUser,
        year_id: Uuid,
    ) -> Result<AcademicYear, ServiceError> {
        actor.require_admin()?;
        let mut tx = self.state.pool.begin().await?;
        let year = activate_exclusive(&mut tx, year_id, actor.user_id).await?;
        tx.commit().await?;

        info!(year_id = %year.id, year = %year.year, "academic year activated");
        Ok(year)
    }

    pub async fn deactivate(
        &self,
        actor: &AuthenticatedUser,
        year_id: Uuid,
    ) -> Result<AcademicYear, ServiceError> {
        actor.require_admin()?;
        let mut tx = self.state.pool.begin().await?;
        lock_years(&mut tx).await?;

        let is_active = sqlx::query_scalar::<_, bool>(
            "SELECT is_active FROM academic_years WHERE id = $1",
        )
        .bind(year_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::not_found("academic year"))?;
        if !is_active {
            return Err(ServiceError::Conflict(
                "academic year is already inactive".into(),
            ));
        }

        let year = sqlx::query_as::<_, AcademicYear>(&format!(
            "UPDATE academic_years SET is_active = FALSE, updated_by = $1, updated_at = $2
             WHERE id = $3
             RETURNING {YEAR_COLUMNS}"
        ))
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(year_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(year_id = %year.id, "academic year deactivated");
        Ok(year)
    }
}

/// Serialises writers of the active flag. Readers are not blocked.
async fn lock_years(tx: &mut Transaction<'_, Postgres>) -> Result<(), ServiceError> {
    sqlx::query("LOCK TABLE academic_years IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Deactivates every other year, then activates `year_id`, inside the
/// caller's transaction. Fails without writing when the year is absent.
pub async fn activate_exclusive(
    tx: &mut Transaction<'_, Postgres>,
    year_id: Uuid,
    actor_id: Uuid,
) -> Result<AcademicYear, ServiceError> {
    lock_years(tx).await?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM academic_years WHERE id = $1")
        .bind(year_id)
        .fetch_one(&mut **tx)
        .await?;
    if exists == 0 {
        return Err(ServiceError::not_found("academic year"));
    }

    let now = Utc::now();
    sqlx::query(
        "UPDATE academic_years SET is_active = FALSE, updated_by = $1, updated_at = $2
         WHERE is_active AND id <> $3",
    )
    .bind(actor_id)
    .bind(now)
    .bind(year_id)
    .execute(&mut **tx)
    .await?;

    let year = sqlx::query_as::<_, AcademicYear>(&format!(
        "UPDATE academic_years SET is_active = TRUE, updated_by = $1, updated_at = $2
         WHERE id = $3
         RETURNING {YEAR_COLUMNS}"
    ))
    .bind(actor_id)
    .bind(now)
    .bind(year_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(year)
}

fn duplicate_label(label: &str) -> ServiceError {
    ServiceError::Conflict(format!("academic year '{label}' already exists"))
}
