//! Vehicle transport ("auto") management and student assignment.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::models::{Auto, AutoStudentMapping},
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::{non_blank, validate_payload},
};

use super::errors::ServiceError;

const AUTO_COLUMNS: &str = "id, name, created_at, updated_at";
const UNASSIGNED: &str = "Unassigned";

#[derive(Debug, Deserialize, Validate)]
pub struct AutoRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignStudentRequest {
    pub student_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct BulkAssignRequest {
    pub student_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AutoRider {
    pub student_id: Uuid,
    pub name: String,
    pub class_name: String,
    pub section_name: String,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub auto_fees: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AutoWithStudents {
    #[serde(flatten)]
    pub auto: Auto,
    pub students: Vec<AutoRider>,
    pub total_auto_fees: Decimal,
}

impl AutoWithStudents {
    fn new(auto: Auto, students: Vec<AutoRider>) -> Self {
        let total_auto_fees = students.iter().map(|s| s.auto_fees).sum();
        Self {
            auto,
            students,
            total_auto_fees,
        }
    }
}

#[derive(Debug, FromRow)]
struct RiderRow {
    auto_id: Uuid,
    #[sqlx(flatten)]
    rider: AutoRider,
}

pub struct AutoService {
    state: Arc<AppState>,
}

impl AutoService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn list(&self) -> Result<Vec<Auto>, ServiceError> {
        let autos = sqlx::query_as::<_, Auto>(&format!(
            "SELECT {AUTO_COLUMNS} FROM autos ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&self.state.pool)
        .await?;
        Ok(autos)
    }

    pub async fn get(&self, auto_id: Uuid) -> Result<Auto, ServiceError> {
        sqlx::query_as::<_, Auto>(&format!("SELECT {AUTO_COLUMNS} FROM autos WHERE id = $1"))
            .bind(auto_id)
            .fetch_optional(&self.state.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("auto"))
    }

    pub async fn get_with_students(&self, auto_id: Uuid) -> Result<AutoWithStudents, ServiceError> {
        let auto = self.get(auto_id).await?;
        let riders = self
            .riders(&[auto_id])
            .await?
            .into_iter()
            .map(|row| row.rider)
            .collect();
        Ok(AutoWithStudents::new(auto, riders))
    }

    /// Every auto with its riders and their combined transport fees.
    pub async fn list_with_students(&self) -> Result<Vec<AutoWithStudents>, ServiceError> {
        let autos = self.list().await?;
        let ids: Vec<Uuid> = autos.iter().map(|a| a.id).collect();
        let mut riders = self.riders(&ids).await?;

        Ok(autos
            .into_iter()
            .map(|auto| {
                let (mine, rest): (Vec<RiderRow>, Vec<RiderRow>) =
                    riders.drain(..).partition(|row| row.auto_id == auto.id);
                riders = rest;
                AutoWithStudents::new(auto, mine.into_iter().map(|row| row.rider).collect())
            })
            .collect())
    }

    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        payload: AutoRequest,
    ) -> Result<Auto, ServiceError> {
        validate_payload(&payload)?;
        let name = non_blank("name", &payload.name)?;
        let now = Utc::now();
        let auto = sqlx::query_as::<_, Auto>(&format!(
            "INSERT INTO autos (id, name, created_by, updated_by, created_at, updated_at)
             VALUES ($1,$2,$3,$3,$4,$4)
             RETURNING {AUTO_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&self.state.pool)
        .await?;
        Ok(auto)
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        auto_id: Uuid,
        payload: AutoRequest,
    ) -> Result<Auto, ServiceError> {
        validate_payload(&payload)?;
        let name = non_blank("name", &payload.name)?;
        sqlx::query_as::<_, Auto>(&format!(
            "UPDATE autos SET name = $1, updated_by = $2, updated_at = $3
             WHERE id = $4
             RETURNING {AUTO_COLUMNS}"
        ))
        .bind(&name)
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(auto_id)
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("auto"))
    }

    pub async fn delete(
        &self,
        actor: &AuthenticatedUser,
        auto_id: Uuid,
    ) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let mut tx = self.state.pool.begin().await?;
        sqlx::query("DELETE FROM auto_student_mappings WHERE auto_id = $1")
            .bind(auto_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM autos WHERE id = $1")
            .bind(auto_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("auto"));
        }
        tx.commit().await?;
        info!(auto_id = %auto_id, "auto deleted");
        Ok(())
    }

    pub async fn assign_student(
        &self,
        auto_id: Uuid,
        payload: AssignStudentRequest,
    ) -> Result<AutoStudentMapping, ServiceError> {
        self.get(auto_id).await?;
        let missing = self.missing_students(&[payload.student_id]).await?;
        if !missing.is_empty() {
            return Err(ServiceError::not_found("student"));
        }

        let mapping = sqlx::query_as::<_, AutoStudentMapping>(
            "INSERT INTO auto_student_mappings (id, auto_id, student_id, created_at)
             VALUES ($1,$2,$3,$4)
             RETURNING id, auto_id, student_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(auto_id)
        .bind(payload.student_id)
        .bind(Utc::now())
        .fetch_one(&self.state.pool)
        .await
        .map_err(|err| match ServiceError::from(err) {
            ServiceError::Conflict(_) => {
                ServiceError::Conflict("student is already assigned to this auto".into())
            }
            other => other,
        })?;
        Ok(mapping)
    }

    /// Replaces the auto's riders with `student_ids`. Nothing is written
    /// unless every student exists.
    pub async fn assign_students_bulk(
        &self,
        auto_id: Uuid,
        payload: BulkAssignRequest,
    ) -> Result<AutoWithStudents, ServiceError> {
        let auto = self.get(auto_id).await?;
        let mut seen = HashSet::new();
        let student_ids: Vec<Uuid> = payload
            .student_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();

        let missing = self.missing_students(&student_ids).await?;
        if !missing.is_empty() {
            let ids: Vec<String> = missing.iter().map(Uuid::to_string).collect();
            return Err(ServiceError::NotFound(format!(
                "students not found: {}",
                ids.join(", ")
            )));
        }

        let mut tx = self.state.pool.begin().await?;
        sqlx::query("DELETE FROM auto_student_mappings WHERE auto_id = $1")
            .bind(auto_id)
            .execute(&mut *tx)
            .await?;
        let now = Utc::now();
        for student_id in &student_ids {
            sqlx::query(
                "INSERT INTO auto_student_mappings (id, auto_id, student_id, created_at)
                 VALUES ($1,$2,$3,$4)",
            )
            .bind(Uuid::new_v4())
            .bind(auto_id)
            .bind(student_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(auto_id = %auto_id, students = student_ids.len(), "auto riders replaced");
        let riders = self
            .riders(&[auto_id])
            .await?
            .into_iter()
            .map(|row| row.rider)
            .collect();
        Ok(AutoWithStudents::new(auto, riders))
    }

    async fn missing_students(&self, student_ids: &[Uuid]) -> Result<Vec<Uuid>, ServiceError> {
        let found: HashSet<Uuid> =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM students WHERE id = ANY($1)")
                .bind(student_ids)
                .fetch_all(&self.state.pool)
                .await?
                .into_iter()
                .collect();
        Ok(student_ids
            .iter()
            .filter(|id| !found.contains(id))
            .copied()
            .collect())
    }

    async fn riders(&self, auto_ids: &[Uuid]) -> Result<Vec<RiderRow>, ServiceError> {
        let rows = sqlx::query_as::<_, RiderRow>(
            "SELECT m.auto_id, s.id AS student_id, s.name,
                    COALESCE(c.name, $2) AS class_name,
                    COALESCE(sec.name, $2) AS section_name,
                    s.contact, s.address, s.auto_fees
             FROM auto_student_mappings m
             JOIN students s ON s.id = m.student_id
             LEFT JOIN classes c ON c.id = s.class_id
             LEFT JOIN sections sec ON sec.id = s.section_id
             WHERE m.auto_id = ANY($1)
             ORDER BY s.name ASC, s.id ASC",
        )
        .bind(auto_ids)
        .bind(UNASSIGNED)
        .fetch_all(&self.state.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rider(name: &str, fee: Decimal) -> AutoRider {
        AutoRider {
            student_id: Uuid::new_v4(),
            name: name.to_string(),
            class_name: UNASSIGNED.to_string(),
            section_name: UNASSIGNED.to_string(),
            contact: None,
            address: None,
            auto_fees: fee,
        }
    }

    #[test]
    fn totals_transport_fees_across_riders() {
        let auto = Auto {
            id: Uuid::new_v4(),
            name: "Route 4".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let riders = vec![rider("Asha", dec!(200)), rider("Ravi", dec!(350.50))];
        let view = AutoWithStudents::new(auto, riders);
        assert_eq!(view.total_auto_fees, dec!(550.50));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "Route 4");
        assert_eq!(json["students"].as_array().unwrap().len(), 2);
    }
}
