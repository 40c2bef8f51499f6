//! Quality gate and score aggregation.
//!
//! This module decides whether a finished task may be committed and
//! computes the final task score from artifact critiques.

mod gate;
mod scoring;

pub use gate::{
    GateFailure, GateThresholds, GateVerdict, QualityGate, DEFAULT_MAX_DEPTH, DEFAULT_MIN_AVERAGE,
    DEFAULT_MIN_DEPTH, DEFAULT_MIN_FILE_SCORE,
};
pub use scoring::{
    IntegrationAdjustment, ScoreSummary, DEFAULT_INTEGRATION_BONUS, DEFAULT_INTEGRATION_PENALTY,
};
