//! Fee accrual and reconciliation.
//!
//! Computes what each student should have paid from their enrollment month
//! through the reporting month, compares it with what was recorded, and
//! reports the difference. Everything here is pure: callers load
//! [`StudentLedger`] values and pass an explicit `as_of` date.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A (year, month) pair ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Months from `self` through `end`, both inclusive. Zero when `end`
    /// precedes `self`.
    pub fn months_through(self, end: YearMonth) -> u32 {
        let span = (end.year - self.year) * 12 + end.month as i32 - self.month as i32 + 1;
        span.max(0) as u32
    }
}

/// One day-boarding fee interval. `end_date == None` means still open.
#[derive(Debug, Clone)]
pub struct BoardingInterval {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub fee: Option<Decimal>,
}

/// The three portions of a recorded payment.
#[derive(Debug, Clone, Default)]
pub struct PaymentPortions {
    pub tuition: Option<Decimal>,
    pub transport: Option<Decimal>,
    pub day_boarding: Option<Decimal>,
}

impl PaymentPortions {
    pub fn total(&self) -> Decimal {
        money(self.tuition) + money(self.transport) + money(self.day_boarding)
    }
}

/// Everything the reconciler needs to know about one student.
#[derive(Debug, Clone)]
pub struct StudentLedger {
    pub student_id: Uuid,
    pub name: String,
    pub enrollment_date: String,
    pub tuition_fees: Option<Decimal>,
    pub transport_fees: Option<Decimal>,
    pub boarding: Vec<BoardingInterval>,
    pub payments: Vec<PaymentPortions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSummary {
    pub student_id: Uuid,
    pub student_name: String,
    pub paid_amount: Decimal,
    pub expected_amount: Decimal,
    /// Negative when the student has overpaid.
    pub due_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("unparsable enrollment date: {0:?}")]
    UnparsableEnrollmentDate(String),
    #[error("day-boarding history has {0} open intervals")]
    MultipleOpenIntervals(usize),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedStudent {
    pub student_id: Uuid,
    pub student_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub as_of: NaiveDate,
    pub total_students: usize,
    pub total_expected: Decimal,
    pub total_paid: Decimal,
    pub total_due: Decimal,
    pub summaries: Vec<FeeSummary>,
    pub skipped: Vec<SkippedStudent>,
}

fn money(value: Option<Decimal>) -> Decimal {
    value.unwrap_or(Decimal::ZERO).round_dp(2)
}

/// Parses the date formats student records carry: plain `YYYY-MM-DD`, a
/// naive `YYYY-MM-DDTHH:MM:SS[.f]` timestamp, or RFC 3339.
pub fn parse_school_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Calendar months from the enrollment month through the `as_of` month,
/// inclusive. Day of month is ignored.
pub fn months_enrolled(enrolled_on: NaiveDate, as_of: NaiveDate) -> u32 {
    YearMonth::of(enrolled_on).months_through(YearMonth::of(as_of))
}

/// Expands boarding intervals into the fee applicable in each month they
/// touch. Open intervals run through `as_of`. Where intervals share a month
/// the later-starting one wins; equal starts keep input order.
pub fn boarding_fee_schedule(
    intervals: &[BoardingInterval],
    as_of: NaiveDate,
) -> BTreeMap<YearMonth, Decimal> {
    let mut ordered: Vec<&BoardingInterval> = intervals.iter().collect();
    ordered.sort_by_key(|interval| interval.start_date);

    let mut schedule = BTreeMap::new();
    for interval in ordered {
        let end = interval.end_date.unwrap_or(as_of);
        if end < interval.start_date {
            continue;
        }
        let fee = money(interval.fee);
        let last = YearMonth::of(end);
        let mut cursor = YearMonth::of(interval.start_date);
        while cursor <= last {
            schedule.insert(cursor, fee);
            cursor = cursor.next();
        }
    }
    schedule
}

/// Sum of monthly dues from the enrollment month through `as_of`.
pub fn expected_total(ledger: &StudentLedger, enrolled_on: NaiveDate, as_of: NaiveDate) -> Decimal {
    let schedule = boarding_fee_schedule(&ledger.boarding, as_of);
    let fixed = money(ledger.tuition_fees) + money(ledger.transport_fees);

    let mut total = Decimal::ZERO;
    let mut cursor = YearMonth::of(enrolled_on);
    for _ in 0..months_enrolled(enrolled_on, as_of) {
        total += fixed + schedule.get(&cursor).copied().unwrap_or(Decimal::ZERO);
        cursor = cursor.next();
    }
    total
}

pub fn paid_total(payments: &[PaymentPortions]) -> Decimal {
    payments.iter().map(PaymentPortions::total).sum()
}

pub fn reconcile_student(
    ledger: &StudentLedger,
    as_of: NaiveDate,
) -> Result<FeeSummary, ReconcileError> {
    let enrolled_on = parse_school_date(&ledger.enrollment_date)
        .ok_or_else(|| ReconcileError::UnparsableEnrollmentDate(ledger.enrollment_date.clone()))?;

    let open = ledger
        .boarding
        .iter()
        .filter(|interval| interval.end_date.is_none())
        .count();
    if open > 1 {
        return Err(ReconcileError::MultipleOpenIntervals(open));
    }

    let expected_amount = expected_total(ledger, enrolled_on, as_of);
    let paid_amount = paid_total(&ledger.payments);

    Ok(FeeSummary {
        student_id: ledger.student_id,
        student_name: ledger.name.clone(),
        paid_amount,
        expected_amount,
        due_amount: expected_amount - paid_amount,
    })
}

/// Lazily reconciles each ledger on its own; a failing student never
/// affects the others.
pub fn reconcile_each(
    ledgers: &[StudentLedger],
    as_of: NaiveDate,
) -> impl Iterator<Item = (&StudentLedger, Result<FeeSummary, ReconcileError>)> + '_ {
    ledgers
        .iter()
        .map(move |ledger| (ledger, reconcile_student(ledger, as_of)))
}

pub fn reconcile_batch(ledgers: &[StudentLedger], as_of: NaiveDate) -> ReconciliationReport {
    let mut summaries = Vec::with_capacity(ledgers.len());
    let mut skipped = Vec::new();

    for (ledger, outcome) in reconcile_each(ledgers, as_of) {
        match outcome {
            Ok(summary) => summaries.push(summary),
            Err(err) => skipped.push(SkippedStudent {
                student_id: ledger.student_id,
                student_name: ledger.name.clone(),
                reason: err.to_string(),
            }),
        }
    }

    summaries.sort_by(|a, b| {
        a.student_name
            .cmp(&b.student_name)
            .then(a.student_id.cmp(&b.student_id))
    });

    let total_expected = summaries.iter().map(|s| s.expected_amount).sum();
    let total_paid = summaries.iter().map(|s| s.paid_amount).sum();
    let total_due = summaries.iter().map(|s| s.due_amount).sum();

    ReconciliationReport {
        as_of,
        total_students: summaries.len(),
        total_expected,
        total_paid,
        total_due,
        summaries,
        skipped,
    }
}
