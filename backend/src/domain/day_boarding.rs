//! Day-boarding interval rules.
//!
//! A student's history is an ordered list of fee intervals with at most one
//! open (`end_date == None`) entry. The open entry is always derived from the
//! list, never stored separately.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::DayBoardingHistory;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardingError {
    #[error("student has {0} open day-boarding intervals")]
    MultipleOpen(usize),
}

/// What a write must do to move the history to a new fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardingChange {
    Unchanged,
    Open {
        fee: Decimal,
        start_date: NaiveDate,
    },
    Close {
        interval_id: Uuid,
        end_date: NaiveDate,
    },
    Replace {
        interval_id: Uuid,
        end_date: NaiveDate,
        fee: Decimal,
    },
}

/// The last open interval, in start order.
pub fn current_interval(history: &[DayBoardingHistory]) -> Option<&DayBoardingHistory> {
    history
        .iter()
        .filter(|entry| entry.end_date.is_none())
        .max_by_key(|entry| entry.start_date)
}

pub fn current_fee(history: &[DayBoardingHistory]) -> Decimal {
    current_interval(history)
        .map(|entry| entry.day_boarding_fees)
        .unwrap_or(Decimal::ZERO)
}

fn ensure_single_open(history: &[DayBoardingHistory]) -> Result<(), BoardingError> {
    let open = history.iter().filter(|e| e.end_date.is_none()).count();
    if open > 1 {
        Err(BoardingError::MultipleOpen(open))
    } else {
        Ok(())
    }
}

/// Plans a fee change effective `today`. A zero fee ends boarding.
pub fn plan_fee_change(
    history: &[DayBoardingHistory],
    new_fee: Decimal,
    today: NaiveDate,
) -> Result<BoardingChange, BoardingError> {
    ensure_single_open(history)?;

    let change = match current_interval(history) {
        Some(current) if current.day_boarding_fees == new_fee => BoardingChange::Unchanged,
        Some(current) if new_fee.is_zero() => BoardingChange::Close {
            interval_id: current.id,
            end_date: close_date(current, today),
        },
        Some(current) => BoardingChange::Replace {
            interval_id: current.id,
            end_date: close_date(current, today),
            fee: new_fee,
        },
        None if new_fee.is_zero() => BoardingChange::Unchanged,
        None => BoardingChange::Open {
            fee: new_fee,
            start_date: today,
        },
    };
    Ok(change)
}

/// Plans ending boarding altogether, e.g. on drop-out.
pub fn plan_close(
    history: &[DayBoardingHistory],
    today: NaiveDate,
) -> Result<BoardingChange, BoardingError> {
    plan_fee_change(history, Decimal::ZERO, today)
}

// An interval opened in the future (clock skew, back-dated import) is
// closed on its own start date.
fn close_date(current: &DayBoardingHistory, today: NaiveDate) -> NaiveDate {
    today.max(current.start_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn interval(start: NaiveDate, end: Option<NaiveDate>, fee: Decimal) -> DayBoardingHistory {
        DayBoardingHistory {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            start_date: start,
            end_date: end,
            day_boarding_fees: fee,
        }
    }

    #[test]
    fn current_interval_is_the_open_one() {
        let history = vec![
            interval(date(2024, 1, 1), Some(date(2024, 2, 1)), dec!(100)),
            interval(date(2024, 2, 1), None, dec!(150)),
        ];
        assert_eq!(current_interval(&history).unwrap().id, history[1].id);
        assert_eq!(current_fee(&history), dec!(150));
        assert_eq!(current_fee(&history[..1]), Decimal::ZERO);
    }

    #[test]
    fn first_fee_opens_an_interval() {
        let change = plan_fee_change(&[], dec!(300), date(2024, 5, 1)).unwrap();
        assert_eq!(
            change,
            BoardingChange::Open {
                fee: dec!(300),
                start_date: date(2024, 5, 1)
            }
        );
        assert_eq!(
            plan_fee_change(&[], Decimal::ZERO, date(2024, 5, 1)).unwrap(),
            BoardingChange::Unchanged
        );
    }

    #[test]
    fn changed_fee_closes_then_opens() {
        let history = vec![interval(date(2024, 1, 1), None, dec!(300))];
        let change = plan_fee_change(&history, dec!(350), date(2024, 6, 10)).unwrap();
        assert_eq!(
            change,
            BoardingChange::Replace {
                interval_id: history[0].id,
                end_date: date(2024, 6, 10),
                fee: dec!(350)
            }
        );
    }

    #[test]
    fn same_fee_is_a_no_op() {
        let history = vec![interval(date(2024, 1, 1), None, dec!(300.00))];
        assert_eq!(
            plan_fee_change(&history, dec!(300), date(2024, 6, 10)).unwrap(),
            BoardingChange::Unchanged
        );
    }

    #[test]
    fn zero_fee_closes_boarding() {
        let history = vec![interval(date(2024, 7, 1), None, dec!(300))];
        let change = plan_close(&history, date(2024, 6, 10)).unwrap();
        assert_eq!(
            change,
            BoardingChange::Close {
                interval_id: history[0].id,
                end_date: date(2024, 7, 1)
            }
        );
    }

    #[test]
    fn inconsistent_history_is_refused() {
        let history = vec![
            interval(date(2024, 1, 1), None, dec!(100)),
            interval(date(2024, 2, 1), None, dec!(200)),
        ];
        assert_eq!(
            plan_fee_change(&history, dec!(250), date(2024, 3, 1)),
            Err(BoardingError::MultipleOpen(2))
        );
    }
}
