//! Periodic autopilot loop.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::state::{AutopilotConfig, OrchestratorState};
use crate::error::{SchedulerError, TaskError};
use crate::metrics::MetricsCollector;
use crate::storage::StoreHandle;
use crate::task::lifecycle::insert_task;
use crate::task::{NewTask, TaskLifecycle, TaskSource};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Disabled,
    GoalReached,
    Waiting { active: usize, cap: usize },
    Created { task_id: String },
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::Disabled => "disabled",
            TickOutcome::GoalReached => "goal_reached",
            TickOutcome::Waiting { .. } => "waiting",
            TickOutcome::Created { .. } => "created",
        }
    }
}

/// A running periodic loop and the channel that stops it.
struct Timer {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Timer {
    /// Ask the loop to exit before its next tick. A tick in flight completes.
    fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Run `tick` every `period` until it returns `false` or a shutdown arrives.
///
/// Shutdown is only observed between ticks, never while one is running.
fn spawn_ticker<F, Fut>(period: Duration, mut tick: F) -> Timer
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Autopilot timer received shutdown signal");
                    break;
                }
                _ = interval.tick() => {}
            }
            if !tick().await {
                break;
            }
        }
    });
    Timer { shutdown_tx, handle }
}

/// Keeps up to `maxActive` pipelines busy until the approved-stream goal is met.
///
/// At most one timer exists at a time; starting replaces it and stopping
/// signals it to exit. Pipelines already spawned are never cancelled.
pub struct AutopilotScheduler {
    store: StoreHandle,
    lifecycle: Arc<TaskLifecycle>,
    wisdom_window: usize,
    timer: Mutex<Option<Timer>>,
    metrics: MetricsCollector,
}

impl AutopilotScheduler {
    pub fn new(store: StoreHandle, lifecycle: Arc<TaskLifecycle>, wisdom_window: usize) -> Self {
        Self {
            store,
            lifecycle,
            wisdom_window,
            timer: Mutex::new(None),
            metrics: MetricsCollector::new(),
        }
    }

    pub async fn state(&self) -> Result<OrchestratorState, SchedulerError> {
        Ok(self.store.snapshot().await?.orchestrator)
    }

    /// Whether a periodic timer is currently alive.
    pub fn timer_active(&self) -> bool {
        self.lock_timer()
            .as_ref()
            .map(|timer| !timer.handle.is_finished())
            .unwrap_or(false)
    }

    /// Enable the autopilot with a clamped config, replace the timer and tick once.
    pub async fn start(self: &Arc<Self>, config: AutopilotConfig) -> Result<TickOutcome, SchedulerError> {
        let registry_default = self.lifecycle.registry_default().to_string();
        let state = self
            .store
            .mutate(move |doc| {
                let stream_len = doc.stream.len();
                let provider = doc.settings.provider_or(&registry_default).to_string();
                doc.orchestrator.apply_start(config, stream_len, &provider);
                doc.orchestrator.clone()
            })
            .await?;

        tracing::info!(
            seed = %state.seed_prompt,
            goal_y = state.goal_y,
            infinite = state.infinite,
            max_active = state.max_active,
            tick_ms = state.tick_ms,
            "Autopilot started"
        );

        self.replace_timer(state.tick_interval());
        self.tick().await
    }

    /// Disable the autopilot and stop the timer.
    pub async fn stop(&self) -> Result<OrchestratorState, SchedulerError> {
        let state = self
            .store
            .mutate(|doc| {
                doc.orchestrator.enabled = false;
                doc.orchestrator.status_message = "stopped".to_string();
                doc.orchestrator.clone()
            })
            .await?;
        self.clear_timer();
        tracing::info!("Autopilot stopped");
        Ok(state)
    }

    /// Restart the timer if the persisted state says the autopilot is enabled.
    pub async fn resume_if_enabled(self: &Arc<Self>) -> Result<bool, SchedulerError> {
        let state = self.state().await?;
        if !state.enabled {
            return Ok(false);
        }
        tracing::info!(tick_ms = state.tick_ms, "Resuming autopilot");
        self.replace_timer(state.tick_interval());
        Ok(true)
    }

    /// One control-loop step.
    pub async fn tick(&self) -> Result<TickOutcome, SchedulerError> {
        if !self.state().await?.enabled {
            self.metrics.record_tick(TickOutcome::Disabled.label());
            return Ok(TickOutcome::Disabled);
        }

        let now = Utc::now();
        let window = self.wisdom_window;
        let registry_default = self.lifecycle.registry_default().to_string();

        let outcome = self
            .store
            .try_mutate(move |doc| -> Result<TickOutcome, TaskError> {
                if !doc.orchestrator.enabled {
                    return Ok(TickOutcome::Disabled);
                }
                doc.orchestrator.last_tick_at = Some(now);

                let stream_len = doc.stream.len();
                if doc.orchestrator.goal_reached(stream_len) {
                    let o = &mut doc.orchestrator;
                    o.enabled = false;
                    o.status_message = format!("goal reached: {} approved", o.target_y);
                    return Ok(TickOutcome::GoalReached);
                }

                let active = doc.active_count();
                let cap = doc.orchestrator.max_active;
                if active >= cap {
                    doc.orchestrator.status_message = format!("waiting: active {}/{}", active, cap);
                    return Ok(TickOutcome::Waiting { active, cap });
                }

                let o = &doc.orchestrator;
                let request = NewTask {
                    prompt: o.next_prompt(&doc.wisdom_log, window),
                    original_prompt: Some(o.seed_prompt.clone()),
                    provider: Some(o.provider.clone()),
                    model: o.model_override(),
                    source: TaskSource::Autopilot,
                    parent_id: None,
                };
                let task_id = insert_task(doc, request, &registry_default)?;

                let o = &mut doc.orchestrator;
                o.total_created += 1;
                o.status_message = format!("created task #{}", o.total_created);
                Ok(TickOutcome::Created { task_id })
            })
            .await?;

        self.metrics.record_tick(outcome.label());
        match &outcome {
            TickOutcome::Disabled => {}
            TickOutcome::GoalReached => {
                tracing::info!("Autopilot goal reached; disabling");
                self.clear_timer();
            }
            TickOutcome::Waiting { active, cap } => {
                tracing::debug!(active = active, cap = cap, "Autopilot waiting for capacity");
            }
            TickOutcome::Created { task_id } => {
                self.metrics.record_task_created(TaskSource::Autopilot.as_str());
                tracing::info!(task_id = %task_id, "Autopilot created task");
                drop(self.lifecycle.start(task_id));
            }
        }
        Ok(outcome)
    }

    fn replace_timer(self: &Arc<Self>, period: Duration) {
        let scheduler = Arc::clone(self);
        let timer = spawn_ticker(period, move || {
            let scheduler = Arc::clone(&scheduler);
            async move {
                match scheduler.tick().await {
                    Ok(TickOutcome::Disabled) | Ok(TickOutcome::GoalReached) => false,
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(error = %e, "Autopilot tick failed");
                        true
                    }
                }
            }
        });

        if let Some(previous) = self.lock_timer().replace(timer) {
            previous.shutdown();
        }
    }

    fn clear_timer(&self) {
        if let Some(timer) = self.lock_timer().take() {
            timer.shutdown();
        }
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<Timer>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
