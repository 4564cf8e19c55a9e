pub mod breaker;
pub mod exposure;
pub mod manager;
pub mod sizer;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RiskError {
    #[error("invalid risk config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("probability out of range: {0}")]
    ProbabilityOutOfRange(Decimal),
}
