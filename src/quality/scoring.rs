//! Score aggregation over a task's artifacts.

use crate::task::{GeneratedFile, IntegrationReport};

/// Default bonus when integration reports the artifacts compatible.
pub const DEFAULT_INTEGRATION_BONUS: f64 = 2.0;

/// Default penalty when integration reports the artifacts incompatible.
pub const DEFAULT_INTEGRATION_PENALTY: f64 = 5.0;

/// Average and minimum over artifact scores. Uncritiqued artifacts count as 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    pub average: f64,
    pub min: f64,
}

impl ScoreSummary {
    pub fn of(files: &[GeneratedFile]) -> Self {
        if files.is_empty() {
            return Self { average: 0.0, min: 0.0 };
        }
        let scores: Vec<f64> = files.iter().map(|f| f.score.unwrap_or(0.0)).collect();
        let sum: f64 = scores.iter().sum();
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        Self {
            average: sum / scores.len() as f64,
            min,
        }
    }
}

/// Adjustment derived from the integration report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationAdjustment {
    pub bonus: f64,
    pub penalty: f64,
}

impl Default for IntegrationAdjustment {
    fn default() -> Self {
        Self {
            bonus: DEFAULT_INTEGRATION_BONUS,
            penalty: DEFAULT_INTEGRATION_PENALTY,
        }
    }
}

impl IntegrationAdjustment {
    /// Signed delta: bonus if compatible, minus penalty if not, 0 when skipped.
    pub fn delta(&self, integration: Option<&IntegrationReport>) -> f64 {
        match integration {
            Some(report) if report.compatible => self.bonus,
            Some(_) => -self.penalty,
            None => 0.0,
        }
    }

    /// Final task score: average plus delta, clamped to 0..=100, rounded half away from zero.
    pub fn final_score(&self, average: f64, integration: Option<&IntegrationReport>) -> f64 {
        (average + self.delta(integration)).clamp(0.0, 100.0).round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(score: Option<f64>) -> GeneratedFile {
        GeneratedFile {
            path: "a.js".into(),
            purpose: String::new(),
            code: String::new(),
            score,
            critique: None,
            z_depth: 1,
            refined: false,
            error: None,
        }
    }

    fn report(compatible: bool) -> IntegrationReport {
        IntegrationReport {
            overall_score: 90.0,
            compatible,
            ..IntegrationReport::default()
        }
    }

    #[test]
    fn test_summary() {
        let summary = ScoreSummary::of(&[file(Some(96.0)), file(Some(97.0))]);
        assert_eq!(summary.average, 96.5);
        assert_eq!(summary.min, 96.0);

        let summary = ScoreSummary::of(&[file(Some(90.0)), file(None)]);
        assert_eq!(summary.average, 45.0);
        assert_eq!(summary.min, 0.0);

        assert_eq!(ScoreSummary::of(&[]), ScoreSummary { average: 0.0, min: 0.0 });
    }

    #[test]
    fn test_final_score_with_compatible_integration() {
        let adjust = IntegrationAdjustment::default();
        assert_eq!(adjust.final_score(96.5, Some(&report(true))), 99.0);
    }

    #[test]
    fn test_final_score_without_integration_rounds_half_up() {
        let adjust = IntegrationAdjustment::default();
        assert_eq!(adjust.final_score(96.5, None), 97.0);
    }

    #[test]
    fn test_final_score_penalty_and_clamp() {
        let adjust = IntegrationAdjustment::default();
        assert_eq!(adjust.final_score(90.0, Some(&report(false))), 85.0);
        assert_eq!(adjust.final_score(99.6, Some(&report(true))), 100.0);
        assert_eq!(adjust.final_score(3.0, Some(&report(false))), 0.0);
    }
}
