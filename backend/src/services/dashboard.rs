//! Dashboard fee reconciliation.
//!
//! Loads one [`StudentLedger`] per active student and hands them to the pure
//! reconciler in [`crate::domain::accrual`]. Students whose records cannot be
//! reconciled are logged and reported as skipped; they never fail the batch.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::FromRow;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    domain::accrual::{
        reconcile_batch, BoardingInterval, PaymentPortions, ReconciliationReport, StudentLedger,
    },
    infrastructure::{db::PgPool, state::AppState},
    validation::rules::iso_date,
};

use super::errors::ServiceError;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub as_of: Option<String>,
}

impl DashboardQuery {
    pub fn as_of_date(&self) -> Result<Option<NaiveDate>, ServiceError> {
        self.as_of
            .as_deref()
            .map(|raw| iso_date("as_of", raw))
            .transpose()
    }
}

/// Where reconciliation input comes from.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn active_ledgers(&self) -> Result<Vec<StudentLedger>, ServiceError>;
}

pub struct PgLedgerSource {
    pool: PgPool,
}

impl PgLedgerSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct LedgerStudentRow {
    id: Uuid,
    name: String,
    enrollment_date: String,
    tuition_fees: Option<Decimal>,
    auto_fees: Option<Decimal>,
}

#[derive(Debug, FromRow)]
struct BoardingRow {
    student_id: Uuid,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    day_boarding_fees: Option<Decimal>,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    student_id: Uuid,
    tuition_fees: Option<Decimal>,
    auto_fees: Option<Decimal>,
    day_boarding_fees: Option<Decimal>,
}

#[async_trait]
impl LedgerSource for PgLedgerSource {
    async fn active_ledgers(&self) -> Result<Vec<StudentLedger>, ServiceError> {
        let students = sqlx::query_as::<_, LedgerStudentRow>(
            "SELECT id, name, enrollment_date, tuition_fees, auto_fees
             FROM students WHERE status = 'ACTIVE'",
        )
        .fetch_all(&self.pool)
        .await?;
        if students.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();

        let boarding = sqlx::query_as::<_, BoardingRow>(
            "SELECT student_id, start_date, end_date, day_boarding_fees
             FROM day_boarding_history
             WHERE student_id = ANY($1)
             ORDER BY start_date ASC, created_at ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let payments = sqlx::query_as::<_, PaymentRow>(
            "SELECT student_id, tuition_fees, auto_fees, day_boarding_fees
             FROM fee_payments WHERE student_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut intervals: HashMap<Uuid, Vec<BoardingInterval>> = HashMap::new();
        for row in boarding {
            intervals.entry(row.student_id).or_default().push(BoardingInterval {
                start_date: row.start_date,
                end_date: row.end_date,
                fee: row.day_boarding_fees,
            });
        }

        let mut paid: HashMap<Uuid, Vec<PaymentPortions>> = HashMap::new();
        for row in payments {
            paid.entry(row.student_id).or_default().push(PaymentPortions {
                tuition: row.tuition_fees,
                transport: row.auto_fees,
                day_boarding: row.day_boarding_fees,
            });
        }

        Ok(students
            .into_iter()
            .map(|student| StudentLedger {
                boarding: intervals.remove(&student.id).unwrap_or_default(),
                payments: paid.remove(&student.id).unwrap_or_default(),
                student_id: student.id,
                name: student.name,
                enrollment_date: student.enrollment_date,
                tuition_fees: student.tuition_fees,
                transport_fees: student.auto_fees,
            })
            .collect())
    }
}

pub struct DashboardService {
    source: Arc<dyn LedgerSource>,
}

impl DashboardService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self::with_source(Arc::new(PgLedgerSource::new(state.pool.clone())))
    }

    pub fn with_source(source: Arc<dyn LedgerSource>) -> Self {
        Self { source }
    }

    /// Reconciles every active student as of `as_of` (today, UTC, when
    /// omitted).
    pub async fn reconcile(
        &self,
        as_of: Option<NaiveDate>,
    ) -> Result<ReconciliationReport, ServiceError> {
        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
        let ledgers = self.source.active_ledgers().await?;
        let report = reconcile_batch(&ledgers, as_of);

        for skipped in &report.skipped {
            warn!(
                student_id = %skipped.student_id,
                student = %skipped.student_name,
                reason = %skipped.reason,
                "skipping student in fee reconciliation"
            );
        }
        info!(
            as_of = %report.as_of,
            students = report.total_students,
            skipped = report.skipped.len(),
            total_due = %report.total_due,
            "fee reconciliation finished"
        );
        Ok(report)
    }
}
