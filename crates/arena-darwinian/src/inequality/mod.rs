//! Inequality metrics module
pub mod calculator;

pub use self::calculator::InequalityCalculator;
