//! Commit-gate decision logic.
//!
//! The gate is a pure function of the refinement depth reached, the average
//! artifact score and the worst artifact score. The same predicate decides
//! when the refinement loop may stop early.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default minimum refinement depth.
pub const DEFAULT_MIN_DEPTH: u32 = 2;

/// Default maximum refinement depth.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Default minimum average score.
pub const DEFAULT_MIN_AVERAGE: f64 = 93.0;

/// Default per-artifact floor.
pub const DEFAULT_MIN_FILE_SCORE: f64 = 85.0;

/// Thresholds the gate compares against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    pub min_depth: u32,
    pub max_depth: u32,
    pub min_average: f64,
    pub min_file_score: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_depth: DEFAULT_MIN_DEPTH,
            max_depth: DEFAULT_MAX_DEPTH,
            min_average: DEFAULT_MIN_AVERAGE,
            min_file_score: DEFAULT_MIN_FILE_SCORE,
        }
    }
}

/// One failed gate condition with the observed and required values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateFailure {
    DepthBelowMinimum { observed: u32, required: u32 },
    AverageBelowMinimum { observed: f64, required: f64 },
    ArtifactBelowFloor { observed: f64, required: f64 },
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::DepthBelowMinimum { observed, required } => {
                write!(f, "depth {} < {}", observed, required)
            }
            GateFailure::AverageBelowMinimum { observed, required } => {
                write!(f, "average {:.1} < {}", observed, required)
            }
            GateFailure::ArtifactBelowFloor { observed, required } => {
                write!(f, "worst artifact {:.1} < {}", observed, required)
            }
        }
    }
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Eligible,
    Ineligible(Vec<GateFailure>),
}

impl GateVerdict {
    pub fn is_eligible(&self) -> bool {
        matches!(self, GateVerdict::Eligible)
    }

    pub fn failures(&self) -> &[GateFailure] {
        match self {
            GateVerdict::Eligible => &[],
            GateVerdict::Ineligible(failures) => failures,
        }
    }

    /// Human-readable summary for the task log.
    pub fn describe(&self) -> String {
        match self {
            GateVerdict::Eligible => "all gate conditions met".to_string(),
            GateVerdict::Ineligible(failures) => failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// The commit gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    thresholds: GateThresholds,
}

impl QualityGate {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &GateThresholds {
        &self.thresholds
    }

    /// Evaluate every condition, collecting all failures.
    pub fn evaluate(&self, depth: u32, average: f64, min_file_score: f64) -> GateVerdict {
        let t = &self.thresholds;
        let mut failures = Vec::new();

        if depth < t.min_depth {
            failures.push(GateFailure::DepthBelowMinimum {
                observed: depth,
                required: t.min_depth,
            });
        }
        if average < t.min_average {
            failures.push(GateFailure::AverageBelowMinimum {
                observed: average,
                required: t.min_average,
            });
        }
        if min_file_score < t.min_file_score {
            failures.push(GateFailure::ArtifactBelowFloor {
                observed: min_file_score,
                required: t.min_file_score,
            });
        }

        if failures.is_empty() {
            GateVerdict::Eligible
        } else {
            GateVerdict::Ineligible(failures)
        }
    }

    /// Whether the refinement loop should stop at this depth.
    pub fn should_stop(&self, depth: u32, average: f64, min_file_score: f64) -> bool {
        depth >= self.thresholds.max_depth
            || self.evaluate(depth, average, min_file_score).is_eligible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligible_at_boundaries() {
        let gate = QualityGate::default();
        assert_eq!(gate.evaluate(2, 93.0, 85.0), GateVerdict::Eligible);
        assert!(gate.evaluate(5, 100.0, 100.0).is_eligible());
    }

    #[test]
    fn test_reports_every_failure() {
        let gate = QualityGate::default();
        let verdict = gate.evaluate(1, 80.0, 0.0);
        assert_eq!(
            verdict.failures(),
            &[
                GateFailure::DepthBelowMinimum { observed: 1, required: 2 },
                GateFailure::AverageBelowMinimum { observed: 80.0, required: 93.0 },
                GateFailure::ArtifactBelowFloor { observed: 0.0, required: 85.0 },
            ]
        );
        assert_eq!(
            verdict.describe(),
            "depth 1 < 2, average 80.0 < 93, worst artifact 0.0 < 85"
        );
    }

    #[test]
    fn test_high_average_with_weak_artifact() {
        let gate = QualityGate::default();
        let verdict = gate.evaluate(3, 95.0, 84.9);
        assert!(matches!(
            verdict.failures(),
            [GateFailure::ArtifactBelowFloor { .. }]
        ));
    }

    #[test]
    fn test_min_depth_enforced_when_quality_sufficient() {
        let gate = QualityGate::default();
        assert!(!gate.should_stop(1, 99.0, 99.0));
        assert!(gate.should_stop(2, 99.0, 99.0));
    }

    #[test]
    fn test_max_depth_stops_loop() {
        let gate = QualityGate::default();
        assert!(!gate.should_stop(4, 50.0, 10.0));
        assert!(gate.should_stop(5, 50.0, 10.0));
    }

    #[test]
    fn test_custom_thresholds() {
        let gate = QualityGate::new(GateThresholds {
            min_depth: 1,
            max_depth: 2,
            min_average: 50.0,
            min_file_score: 40.0,
        });
        assert!(gate.evaluate(1, 50.0, 40.0).is_eligible());
    }

    #[test]
    fn test_failure_serialization() {
        let failure = GateFailure::DepthBelowMinimum { observed: 1, required: 2 };
        let json = serde_json::to_value(failure).unwrap();
        assert_eq!(json["kind"], "depth_below_minimum");
        assert_eq!(json["observed"], 1);
    }
}
