use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::models::{FeePayment, Month},
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::rules::{validate_payload, within_cap},
};

use super::errors::ServiceError;

const PAYMENT_COLUMNS: &str = "id, student_id, month, tuition_fees, auto_fees, \
     day_boarding_fees, total_amount, transaction_date, receipt_number, created_at, updated_at";

/// Payment input. Any client-supplied total is ignored; the stored total is
/// always the sum of the three portions.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    pub student_id: Uuid,
    pub month: Month,
    #[serde(default)]
    pub tuition_fees: Decimal,
    #[serde(default)]
    pub auto_fees: Decimal,
    #[serde(default)]
    pub day_boarding_fees: Decimal,
    pub transaction_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 64))]
    pub receipt_number: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePaymentRequest {
    pub student_id: Option<Uuid>,
    pub month: Option<Month>,
    pub tuition_fees: Option<Decimal>,
    pub auto_fees: Option<Decimal>,
    pub day_boarding_fees: Option<Decimal>,
    pub transaction_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 64))]
    pub receipt_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentFilter {
    pub student_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Portions {
    tuition: Decimal,
    transport: Decimal,
    day_boarding: Decimal,
}

impl Portions {
    fn checked(
        tuition: Decimal,
        transport: Decimal,
        day_boarding: Decimal,
        cap: Decimal,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            tuition: within_cap("tuition_fees", tuition, cap)?,
            transport: within_cap("auto_fees", transport, cap)?,
            day_boarding: within_cap("day_boarding_fees", day_boarding, cap)?,
        })
    }

    fn total(&self) -> Decimal {
        self.tuition + self.transport + self.day_boarding
    }
}

pub struct FeePaymentService {
    state: Arc<AppState>,
}

impl FeePaymentService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn list(&self, filter: PaymentFilter) -> Result<Vec<FeePayment>, ServiceError> {
        let payments = sqlx::query_as::<_, FeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM fee_payments
             WHERE ($1::uuid IS NULL OR student_id = $1)
             ORDER BY transaction_date DESC, id ASC"
        ))
        .bind(filter.student_id)
        .fetch_all(&self.state.pool)
        .await?;
        Ok(payments)
    }

    pub async fn get(&self, payment_id: Uuid) -> Result<FeePayment, ServiceError> {
        sqlx::query_as::<_, FeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM fee_payments WHERE id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("fee payment"))
    }

    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        payload: CreatePaymentRequest,
    ) -> Result<FeePayment, ServiceError> {
        validate_payload(&payload)?;
        let cap = self.state.config.fees.max_payment_amount;
        let portions = Portions::checked(
            payload.tuition_fees,
            payload.auto_fees,
            payload.day_boarding_fees,
            cap,
        )?;
        self.ensure_student(payload.student_id).await?;

        let now = Utc::now();
        let payment = sqlx::query_as::<_, FeePayment>(&format!(
            "INSERT INTO fee_payments (id, student_id, month, tuition_fees, auto_fees,
                 day_boarding_fees, total_amount, transaction_date, receipt_number,
                 created_by, updated_by, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$10,$11,$11)
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(payload.student_id)
        .bind(payload.month)
        .bind(portions.tuition)
        .bind(portions.transport)
        .bind(portions.day_boarding)
        .bind(portions.total())
        .bind(payload.transaction_date.unwrap_or(now))
        .bind(&payload.receipt_number)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&self.state.pool)
        .await?;

        info!(
            payment_id = %payment.id,
            student_id = %payment.student_id,
            month = payment.month.as_str(),
            total = %payment.total_amount,
            "fee payment recorded"
        );
        Ok(payment)
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        payment_id: Uuid,
        payload: UpdatePaymentRequest,
    ) -> Result<FeePayment, ServiceError> {
        validate_payload(&payload)?;
        let current = self.get(payment_id).await?;
        let cap = self.state.config.fees.max_payment_amount;
        let portions = Portions::checked(
            payload.tuition_fees.unwrap_or(current.tuition_fees),
            payload.auto_fees.unwrap_or(current.auto_fees),
            payload.day_boarding_fees.unwrap_or(current.day_boarding_fees),
            cap,
        )?;

        let student_id = payload.student_id.unwrap_or(current.student_id);
        if student_id != current.student_id {
            self.ensure_student(student_id).await?;
        }

        let payment = sqlx::query_as::<_, FeePayment>(&format!(
            "UPDATE fee_payments SET student_id = $1, month = $2, tuition_fees = $3,
                 auto_fees = $4, day_boarding_fees = $5, total_amount = $6,
                 transaction_date = $7, receipt_number = $8, updated_by = $9, updated_at = $10
             WHERE id = $11
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(student_id)
        .bind(payload.month.unwrap_or(current.month))
        .bind(portions.tuition)
        .bind(portions.transport)
        .bind(portions.day_boarding)
        .bind(portions.total())
        .bind(payload.transaction_date.unwrap_or(current.transaction_date))
        .bind(payload.receipt_number.or(current.receipt_number))
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(payment_id)
        .fetch_one(&self.state.pool)
        .await?;
        Ok(payment)
    }

    pub async fn delete(
        &self,
        actor: &AuthenticatedUser,
        payment_id: Uuid,
    ) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let result = sqlx::query("DELETE FROM fee_payments WHERE id = $1")
            .bind(payment_id)
            .execute(&self.state.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("fee payment"));
        }
        info!(payment_id = %payment_id, "fee payment deleted");
        Ok(())
    }

    async fn ensure_student(&self, student_id: Uuid) -> Result<(), ServiceError> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM students WHERE id = $1")
            .bind(student_id)
            .fetch_one(&self.state.pool)
            .await?;
        if exists == 0 {
            return Err(ServiceError::NotFound(format!(
                "student with id {student_id} not found"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_is_sum_of_rounded_portions() {
        let portions =
            Portions::checked(dec!(1000.004), dec!(200), dec!(300.5), dec!(1000000)).unwrap();
        assert_eq!(portions.total(), dec!(1500.50));
    }

    #[test]
    fn portions_above_cap_are_rejected() {
        let err = Portions::checked(dec!(10), dec!(0), dec!(0), dec!(5)).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("tuition_fees")));
    }

    #[test]
    fn negative_portions_are_rejected() {
        let err = Portions::checked(dec!(0), dec!(-1), dec!(0), dec!(100)).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("auto_fees")));
    }

    #[test]
    fn client_total_is_not_part_of_the_request() {
        let payload: CreatePaymentRequest = serde_json::from_value(serde_json::json!({
            "student_id": Uuid::nil(),
            "month": "MAR",
            "tuition_fees": "1000",
            "auto_fees": "200",
            "total_amount": "99999"
        }))
        .unwrap();
        let portions = Portions::checked(
            payload.tuition_fees,
            payload.auto_fees,
            payload.day_boarding_fees,
            dec!(1000000),
        )
        .unwrap();
        assert_eq!(portions.total(), dec!(1200));
    }
}
