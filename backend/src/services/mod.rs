pub mod academic_years;
pub mod autos;
pub mod classes;
pub mod dashboard;
pub mod errors;
pub mod fee_payments;
pub mod sections;
pub mod students;
