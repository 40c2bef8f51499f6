//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by polyplex and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

/// Serializes initialization so every metric lands in the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Global Prometheus registry for all polyplex metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Tasks created, labeled by source (manual, autopilot, retry).
pub static TASKS_CREATED: OnceLock<CounterVec> = OnceLock::new();

/// Pipeline outcomes, labeled by resulting status.
pub static TASK_OUTCOMES: OnceLock<CounterVec> = OnceLock::new();

/// Completion calls, labeled by role and outcome.
pub static COMPLETIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Completion latency in seconds, labeled by role.
pub static COMPLETION_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Distribution of final task scores (0-100).
pub static FINAL_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Autopilot ticks, labeled by outcome.
pub static AUTOPILOT_TICKS: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Safe to call more than once; later calls leave the first registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric construction or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let tasks_created = CounterVec::new(
        Opts::new("polyplex_tasks_created_total", "Tasks created"),
        &["source"],
    )?;

    let task_outcomes = CounterVec::new(
        Opts::new("polyplex_task_outcomes_total", "Pipeline outcomes by status"),
        &["status"],
    )?;

    let completions_total = CounterVec::new(
        Opts::new("polyplex_completions_total", "Completion gateway calls"),
        &["role", "outcome"],
    )?;

    let completion_latency = HistogramVec::new(
        HistogramOpts::new(
            "polyplex_completion_latency_seconds",
            "Completion latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["role"],
    )?;

    let final_score = Histogram::with_opts(
        HistogramOpts::new("polyplex_final_score", "Distribution of final task scores")
            .buckets(vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 85.0, 90.0, 93.0, 95.0, 100.0]),
    )?;

    let autopilot_ticks = CounterVec::new(
        Opts::new("polyplex_autopilot_ticks_total", "Autopilot ticks by outcome"),
        &["outcome"],
    )?;

    registry.register(Box::new(tasks_created.clone()))?;
    registry.register(Box::new(task_outcomes.clone()))?;
    registry.register(Box::new(completions_total.clone()))?;
    registry.register(Box::new(completion_latency.clone()))?;
    registry.register(Box::new(final_score.clone()))?;
    registry.register(Box::new(autopilot_ticks.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = TASKS_CREATED.set(tasks_created);
    let _ = TASK_OUTCOMES.set(task_outcomes);
    let _ = COMPLETIONS_TOTAL.set(completions_total);
    let _ = COMPLETION_LATENCY.set(completion_latency);
    let _ = FINAL_SCORE.set(final_score);
    let _ = AUTOPILOT_TICKS.set(autopilot_ticks);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// HTTP handler for the /metrics endpoint.
pub async fn metrics_handler() -> String {
    export_metrics()
}
