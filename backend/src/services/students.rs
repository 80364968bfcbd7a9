//! Student enrollment and the day-boarding interval history.
//!
//! Fee changes for day-boarding never edit an interval's fee in place: the
//! open interval is closed and a new one opened, under a row lock on the
//! student, so the history stays usable for accrual.

use std::{collections::HashMap, sync::Arc};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{
        day_boarding::{self, BoardingChange},
        models::{DayBoardingHistory, Student, StudentStatus},
    },
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::{birth_before_enrollment, non_blank, validate_payload, within_cap},
};

use super::errors::ServiceError;

const STUDENT_COLUMNS: &str = "id, name, roll_number, father_name, mother_name, date_of_birth, \
     contact, address, enrollment_date, tuition_fees, auto_fees, class_id, section_id, \
     academic_year_id, status, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, student_id, start_date, end_date, day_boarding_fees";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 20))]
    pub roll_number: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub date_of_birth: String,
    #[validate(length(max = 30))]
    pub contact: Option<String>,
    pub address: Option<String>,
    pub enrollment_date: String,
    #[serde(default)]
    pub tuition_fees: Decimal,
    #[serde(default)]
    pub auto_fees: Decimal,
    #[serde(default)]
    pub day_boarding_fees: Decimal,
    pub class_id: Option<Uuid>,
    pub section_id: Option<Uuid>,
    pub academic_year_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateStudentRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub roll_number: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub date_of_birth: Option<String>,
    #[validate(length(max = 30))]
    pub contact: Option<String>,
    pub address: Option<String>,
    pub enrollment_date: Option<String>,
    pub tuition_fees: Option<Decimal>,
    pub auto_fees: Option<Decimal>,
    pub day_boarding_fees: Option<Decimal>,
    pub class_id: Option<Uuid>,
    pub section_id: Option<Uuid>,
    pub academic_year_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StudentFilter {
    pub status: Option<StudentStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DayBoardingFilter {
    pub academic_year_id: Option<Uuid>,
}

/// A student together with the fee of their open day-boarding interval.
#[derive(Debug, Serialize)]
pub struct StudentView {
    #[serde(flatten)]
    pub student: Student,
    pub day_boarding_fees: Decimal,
}

pub struct StudentService {
    state: Arc<AppState>,
}

impl StudentService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Lists students, hiding soft-deleted ones unless asked for them.
    pub async fn list(&self, filter: StudentFilter) -> Result<Vec<StudentView>, ServiceError> {
        let students = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             WHERE ($1::student_status IS NULL AND status <> 'DELETED') OR status = $1
             ORDER BY name ASC, id ASC"
        ))
        .bind(filter.status)
        .fetch_all(&self.state.pool)
        .await?;

        let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
        let open_fees: HashMap<Uuid, Decimal> = sqlx::query_as::<_, (Uuid, Decimal)>(
            "SELECT student_id, day_boarding_fees FROM day_boarding_history
             WHERE end_date IS NULL AND student_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.state.pool)
        .await?
        .into_iter()
        .collect();

        Ok(students
            .into_iter()
            .map(|student| {
                let fee = open_fees.get(&student.id).copied().unwrap_or(Decimal::ZERO);
                StudentView {
                    student,
                    day_boarding_fees: fee,
                }
            })
            .collect())
    }

    pub async fn get(&self, student_id: Uuid) -> Result<StudentView, ServiceError> {
        let student = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1"
        ))
        .bind(student_id)
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("student"))?;
        let history = self.history(student_id).await?;

        Ok(StudentView {
            day_boarding_fees: day_boarding::current_fee(&history),
            student,
        })
    }

    pub async fn history(&self, student_id: Uuid) -> Result<Vec<DayBoardingHistory>, ServiceError> {
        let history = sqlx::query_as::<_, DayBoardingHistory>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM day_boarding_history
             WHERE student_id = $1
             ORDER BY start_date ASC, created_at ASC"
        ))
        .bind(student_id)
        .fetch_all(&self.state.pool)
        .await?;
        Ok(history)
    }

    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        payload: CreateStudentRequest,
    ) -> Result<StudentView, ServiceError> {
        validate_payload(&payload)?;
        let name = non_blank("name", &payload.name)?;
        let (_, enrolled_on) =
            birth_before_enrollment(&payload.date_of_birth, &payload.enrollment_date)?;
        let cap = self.state.config.fees.max_payment_amount;
        let tuition_fees = within_cap("tuition_fees", payload.tuition_fees, cap)?;
        let auto_fees = within_cap("auto_fees", payload.auto_fees, cap)?;
        let boarding_fee = within_cap("day_boarding_fees", payload.day_boarding_fees, cap)?;

        let academic_year_id = match payload.academic_year_id {
            Some(id) => Some(id),
            None => self.active_year_id().await?,
        };

        let mut tx = self.state.pool.begin().await?;
        ensure_placement(&mut tx, payload.class_id, payload.section_id).await?;
        ensure_unique_roll(&mut tx, payload.roll_number.as_deref(), payload.class_id, None).await?;

        let now = Utc::now();
        let student = sqlx::query_as::<_, Student>(&format!(
            "INSERT INTO students (id, name, roll_number, father_name, mother_name, date_of_birth,
                 contact, address, enrollment_date, tuition_fees, auto_fees, class_id, section_id,
                 academic_year_id, status,
                 created_by, updated_by, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$16,$17,$17)
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(&payload.roll_number)
        .bind(&payload.father_name)
        .bind(&payload.mother_name)
        .bind(payload.date_of_birth.trim())
        .bind(&payload.contact)
        .bind(&payload.address)
        .bind(payload.enrollment_date.trim())
        .bind(tuition_fees)
        .bind(auto_fees)
        .bind(payload.class_id)
        .bind(payload.section_id)
        .bind(academic_year_id)
        .bind(StudentStatus::Active)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // Boarding taken at enrollment accrues from the enrollment month.
        if !boarding_fee.is_zero() {
            let change = BoardingChange::Open {
                fee: boarding_fee,
                start_date: enrolled_on,
            };
            apply_boarding_change(&mut tx, student.id, change).await?;
        }
        tx.commit().await?;

        info!(student_id = %student.id, "student enrolled");
        Ok(StudentView {
            student,
            day_boarding_fees: boarding_fee,
        })
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        student_id: Uuid,
        payload: UpdateStudentRequest,
    ) -> Result<StudentView, ServiceError> {
        validate_payload(&payload)?;
        let mut tx = self.state.pool.begin().await?;
        let current = lock_student(&mut tx, student_id).await?;

        let name = match payload.name.as_deref() {
            Some(name) => non_blank("name", name)?,
            None => current.name.clone(),
        };
        let date_of_birth = payload
            .date_of_birth
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.date_of_birth)
            .to_string();
        let enrollment_date = payload
            .enrollment_date
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.enrollment_date)
            .to_string();
        if payload.date_of_birth.is_some() || payload.enrollment_date.is_some() {
            birth_before_enrollment(&date_of_birth, &enrollment_date)?;
        }

        let cap = self.state.config.fees.max_payment_amount;
        let tuition_fees = match payload.tuition_fees {
            Some(fee) => within_cap("tuition_fees", fee, cap)?,
            None => current.tuition_fees,
        };
        let auto_fees = match payload.auto_fees {
            Some(fee) => within_cap("auto_fees", fee, cap)?,
            None => current.auto_fees,
        };
        let boarding_fee = payload
            .day_boarding_fees
            .map(|fee| within_cap("day_boarding_fees", fee, cap))
            .transpose()?;

        let class_id = payload.class_id.or(current.class_id);
        let section_id = payload.section_id.or(current.section_id);
        if payload.class_id.is_some() || payload.section_id.is_some() {
            ensure_placement(&mut tx, class_id, section_id).await?;
        }
        let roll_number = payload.roll_number.clone().or(current.roll_number.clone());
        if payload.roll_number.is_some() || payload.class_id.is_some() {
            ensure_unique_roll(&mut tx, roll_number.as_deref(), class_id, Some(student_id)).await?;
        }

        let student = sqlx::query_as::<_, Student>(&format!(
            "UPDATE students SET name = $1, roll_number = $2, father_name = $3, mother_name = $4,
                 date_of_birth = $5, contact = $6, address = $7, enrollment_date = $8,
                 tuition_fees = $9, auto_fees = $10, class_id = $11, section_id = $12,
                 academic_year_id = $13, updated_by = $14, updated_at = $15
             WHERE id = $16
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(&name)
        .bind(&roll_number)
        .bind(payload.father_name.as_ref().or(current.father_name.as_ref()))
        .bind(payload.mother_name.as_ref().or(current.mother_name.as_ref()))
        .bind(&date_of_birth)
        .bind(payload.contact.as_ref().or(current.contact.as_ref()))
        .bind(payload.address.as_ref().or(current.address.as_ref()))
        .bind(&enrollment_date)
        .bind(tuition_fees)
        .bind(auto_fees)
        .bind(class_id)
        .bind(section_id)
        .bind(payload.academic_year_id.or(current.academic_year_id))
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(student_id)
        .fetch_one(&mut *tx)
        .await?;

        let history = load_history(&mut tx, student_id).await?;
        let day_boarding_fees = match boarding_fee {
            Some(fee) => {
                let change = day_boarding::plan_fee_change(&history, fee, today())
                    .map_err(|err| ServiceError::Conflict(err.to_string()))?;
                apply_boarding_change(&mut tx, student_id, change).await?;
                fee
            }
            None => day_boarding::current_fee(&history),
        };
        tx.commit().await?;

        Ok(StudentView {
            student,
            day_boarding_fees,
        })
    }

    /// Marks the student as dropped off and ends any day-boarding.
    pub async fn drop_out(
        &self,
        actor: &AuthenticatedUser,
        student_id: Uuid,
    ) -> Result<Student, ServiceError> {
        self.retire(actor, student_id, StudentStatus::DroppedOff).await
    }

    /// Soft delete: history and payments are retained for reporting.
    pub async fn delete(
        &self,
        actor: &AuthenticatedUser,
        student_id: Uuid,
    ) -> Result<(), ServiceError> {
        actor.require_admin()?;
        self.retire(actor, student_id, StudentStatus::Deleted).await?;
        Ok(())
    }

    async fn retire(
        &self,
        actor: &AuthenticatedUser,
        student_id: Uuid,
        status: StudentStatus,
    ) -> Result<Student, ServiceError> {
        let mut tx = self.state.pool.begin().await?;
        lock_student(&mut tx, student_id).await?;

        let student = sqlx::query_as::<_, Student>(&format!(
            "UPDATE students SET status = $1, updated_by = $2, updated_at = $3
             WHERE id = $4
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(status)
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(student_id)
        .fetch_one(&mut *tx)
        .await?;

        let history = load_history(&mut tx, student_id).await?;
        match day_boarding::plan_close(&history, today()) {
            Ok(change) => apply_boarding_change(&mut tx, student_id, change).await?,
            Err(err) => {
                warn!(
                    student_id = %student_id,
                    error = %err,
                    "leaving inconsistent boarding history open"
                );
            }
        }
        tx.commit().await?;
        info!(student_id = %student_id, status = status.as_str(), "student retired");
        Ok(student)
    }

    pub async fn by_class(&self, class_id: Uuid) -> Result<Vec<Student>, ServiceError> {
        let students = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             WHERE class_id = $1 AND status <> 'DELETED'
             ORDER BY roll_number ASC NULLS LAST, name ASC"
        ))
        .bind(class_id)
        .fetch_all(&self.state.pool)
        .await?;
        Ok(students)
    }

    pub async fn by_section(&self, section_id: Uuid) -> Result<Vec<Student>, ServiceError> {
        let students = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             WHERE section_id = $1 AND status <> 'DELETED'
             ORDER BY roll_number ASC NULLS LAST, name ASC"
        ))
        .bind(section_id)
        .fetch_all(&self.state.pool)
        .await?;
        Ok(students)
    }

    /// Active students with an open day-boarding interval.
    pub async fn day_boarding_students(
        &self,
        filter: DayBoardingFilter,
    ) -> Result<Vec<StudentView>, ServiceError> {
        let rows = sqlx::query_as::<_, BoardingStudentRow>(
            "SELECT s.id, h.day_boarding_fees
             FROM students s
             JOIN day_boarding_history h ON h.student_id = s.id AND h.end_date IS NULL
             WHERE s.status = 'ACTIVE' AND ($1::uuid IS NULL OR s.academic_year_id = $1)",
        )
        .bind(filter.academic_year_id)
        .fetch_all(&self.state.pool)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let fees: HashMap<Uuid, Decimal> = rows
            .into_iter()
            .map(|r| (r.id, r.day_boarding_fees))
            .collect();
        let ids: Vec<Uuid> = fees.keys().copied().collect();
        let students = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ANY($1) ORDER BY name ASC, id ASC"
        ))
        .bind(&ids)
        .fetch_all(&self.state.pool)
        .await?;

        Ok(students
            .into_iter()
            .map(|student| StudentView {
                day_boarding_fees: fees.get(&student.id).copied().unwrap_or(Decimal::ZERO),
                student,
            })
            .collect())
    }

    async fn active_year_id(&self) -> Result<Option<Uuid>, ServiceError> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM academic_years WHERE is_active")
            .fetch_optional(&self.state.pool)
            .await?;
        Ok(id)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BoardingStudentRow {
    id: Uuid,
    day_boarding_fees: Decimal,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn lock_student(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
) -> Result<Student, ServiceError> {
    sqlx::query_as::<_, Student>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1 FOR UPDATE"
    ))
    .bind(student_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| ServiceError::not_found("student"))
}

async fn load_history(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
) -> Result<Vec<DayBoardingHistory>, ServiceError> {
    let history = sqlx::query_as::<_, DayBoardingHistory>(&format!(
        "SELECT {HISTORY_COLUMNS} FROM day_boarding_history
         WHERE student_id = $1
         ORDER BY start_date ASC, created_at ASC"
    ))
    .bind(student_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(history)
}

/// Writes a planned change. Closing always happens before opening so the
/// one-open-interval index is never violated mid-transaction.
async fn apply_boarding_change(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
    change: BoardingChange,
) -> Result<(), ServiceError> {
    let (close, open) = match change {
        BoardingChange::Unchanged => (None, None),
        BoardingChange::Open { fee, start_date } => (None, Some((fee, start_date))),
        BoardingChange::Close {
            interval_id,
            end_date,
        } => (Some((interval_id, end_date)), None),
        BoardingChange::Replace {
            interval_id,
            end_date,
            fee,
        } => (Some((interval_id, end_date)), Some((fee, end_date))),
    };

    if let Some((interval_id, end_date)) = close {
        sqlx::query(
            "UPDATE day_boarding_history SET end_date = $1
             WHERE id = $2 AND end_date IS NULL",
        )
        .bind(end_date)
        .bind(interval_id)
        .execute(&mut **tx)
        .await?;
    }
    if let Some((fee, start_date)) = open {
        sqlx::query(
            "INSERT INTO day_boarding_history
                 (id, student_id, start_date, end_date, day_boarding_fees)
             VALUES ($1,$2,$3,NULL,$4)",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(start_date)
        .bind(fee)
        .execute(&mut **tx)
        .await?;
        info!(student_id = %student_id, fee = %fee, "day-boarding interval opened");
    }
    Ok(())
}

async fn ensure_placement(
    tx: &mut Transaction<'_, Postgres>,
    class_id: Option<Uuid>,
    section_id: Option<Uuid>,
) -> Result<(), ServiceError> {
    if let Some(class_id) = class_id {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM classes WHERE id = $1")
            .bind(class_id)
            .fetch_one(&mut **tx)
            .await?;
        if exists == 0 {
            return Err(ServiceError::Validation(format!(
                "class with id {class_id} does not exist"
            )));
        }
    }

    if let Some(section_id) = section_id {
        let owner = sqlx::query_scalar::<_, Uuid>("SELECT class_id FROM sections WHERE id = $1")
            .bind(section_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| {
                ServiceError::Validation(format!("section with id {section_id} does not exist"))
            })?;
        if class_id.is_some_and(|class_id| class_id != owner) {
            return Err(ServiceError::Validation(
                "section does not belong to the given class".into(),
            ));
        }
    }
    Ok(())
}

async fn ensure_unique_roll(
    tx: &mut Transaction<'_, Postgres>,
    roll_number: Option<&str>,
    class_id: Option<Uuid>,
    exclude: Option<Uuid>,
) -> Result<(), ServiceError> {
    let (Some(roll_number), Some(class_id)) = (roll_number, class_id) else {
        return Ok(());
    };
    let clash = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(1) FROM students
         WHERE roll_number = $1 AND class_id = $2 AND status <> 'DELETED'
           AND ($3::uuid IS NULL OR id <> $3)",
    )
    .bind(roll_number)
    .bind(class_id)
    .bind(exclude)
    .fetch_one(&mut **tx)
    .await?;
    if clash > 0 {
        return Err(ServiceError::Conflict(format!(
            "student with roll number '{roll_number}' already exists in this class"
        )));
    }
    Ok(())
}
