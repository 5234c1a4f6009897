pub mod constituencies;
pub mod health;
pub mod totals;
pub mod uploads;
