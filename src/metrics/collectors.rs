//! High-level recording interface over the raw Prometheus metrics.
//!
//! Recording is a no-op until [`init_metrics`](super::init_metrics) has run,
//! so library code and tests can record unconditionally.

use super::prometheus::{
    AUTOPILOT_TICKS, COMPLETIONS_TOTAL, COMPLETION_LATENCY, FINAL_SCORE, TASKS_CREATED,
    TASK_OUTCOMES,
};

/// Metrics collector for polyplex operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a task creation.
    pub fn record_task_created(&self, source: &str) {
        if let Some(created) = TASKS_CREATED.get() {
            created.with_label_values(&[source]).inc();
        }
    }

    /// Record the status a pipeline finished with and, when known, its final score.
    pub fn record_task_outcome(&self, status: &str, final_score: Option<f64>) {
        if let Some(outcomes) = TASK_OUTCOMES.get() {
            outcomes.with_label_values(&[status]).inc();
        }
        if let (Some(histogram), Some(score)) = (FINAL_SCORE.get(), final_score) {
            histogram.observe(score);
        }

        tracing::trace!(status = status, final_score = ?final_score, "Recorded task outcome");
    }

    /// Record one completion-gateway call.
    pub fn record_completion(&self, role: &str, success: bool, latency_secs: f64) {
        let outcome = if success { "success" } else { "failure" };

        if let Some(total) = COMPLETIONS_TOTAL.get() {
            total.with_label_values(&[role, outcome]).inc();
        }
        if let Some(latency) = COMPLETION_LATENCY.get() {
            latency.with_label_values(&[role]).observe(latency_secs);
        }
    }

    /// Record an autopilot tick outcome (disabled, goal_reached, waiting, created).
    pub fn record_tick(&self, outcome: &str) {
        if let Some(ticks) = AUTOPILOT_TICKS.get() {
            ticks.with_label_values(&[outcome]).inc();
        }
    }
}
