pub mod display;
pub mod units;
