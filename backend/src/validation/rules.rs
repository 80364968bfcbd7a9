use chrono::NaiveDate;
use rust_decimal::Decimal;
use validator::{Validate, ValidationErrors};

use crate::{domain::accrual::parse_school_date, services::errors::ServiceError};

/// Runs the derived `validator` checks on a request payload.
pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), ServiceError> {
    payload
        .validate()
        .map_err(|errors| ServiceError::Validation(describe(&errors)))
}

fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<&str> = errors.field_errors().keys().copied().collect();
    fields.sort_unstable();
    format!("invalid fields: {}", fields.join(", "))
}

pub fn non_negative(field: &str, amount: Decimal) -> Result<Decimal, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::Validation(format!("{field} cannot be negative")));
    }
    Ok(amount.round_dp(2))
}

pub fn within_cap(field: &str, amount: Decimal, cap: Decimal) -> Result<Decimal, ServiceError> {
    let amount = non_negative(field, amount)?;
    if amount > cap {
        return Err(ServiceError::Validation(format!(
            "{field} exceeds the maximum of {cap}"
        )));
    }
    Ok(amount)
}

pub fn iso_date(field: &str, raw: &str) -> Result<NaiveDate, ServiceError> {
    parse_school_date(raw).ok_or_else(|| {
        ServiceError::Validation(format!("{field} must be a date in YYYY-MM-DD form"))
    })
}

/// Date of birth must fall strictly before the enrollment date.
pub fn birth_before_enrollment(
    date_of_birth: &str,
    enrollment_date: &str,
) -> Result<(NaiveDate, NaiveDate), ServiceError> {
    let born = iso_date("date_of_birth", date_of_birth)?;
    let enrolled = iso_date("enrollment_date", enrollment_date)?;
    if born >= enrolled {
        return Err(ServiceError::Validation(
            "date_of_birth must be before enrollment_date".into(),
        ));
    }
    Ok((born, enrolled))
}

pub fn non_blank(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{field} cannot be blank")));
    }
    Ok(trimmed.to_string())
}
