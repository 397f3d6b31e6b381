//! Episode and run scoring.

pub mod calibration;
pub mod compliance;

pub use calibration::{brier_score, expected_calibration_error, DEFAULT_BINS};
pub use compliance::{
    abstention_utility, hard_violation_rate, spec_compliance, CostModel, Decision, SoftTerm,
    SOFT_WEIGHT_LAMBDA,
};
