pub mod academic_year;
pub mod accrual;
pub mod day_boarding;
pub mod models;
