//! Task state machine and the operator-facing lifecycle operations.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::types::{ApprovalReason, NewTask, StreamEntry, Task, TaskSource, TaskStatus};
use crate::error::TaskError;
use crate::metrics::MetricsCollector;
use crate::pipeline::PipelineEngine;
use crate::storage::{Snapshot, StoreHandle};

/// Valid status transitions.
///
/// Deletion is not a transition; it is allowed from any status.
pub struct LifecycleRules {
    valid_transitions: HashMap<TaskStatus, Vec<TaskStatus>>,
}

impl LifecycleRules {
    /// Standard rules:
    /// - Running -> PendingApproval | NeedsWork | Error (pipeline outcome)
    /// - Running -> Rejected (operator abandons a run)
    /// - PendingApproval | NeedsWork | Error -> Approved | Rejected
    /// - Approved and Rejected are terminal
    pub fn new() -> Self {
        let mut valid_transitions = HashMap::new();

        valid_transitions.insert(
            TaskStatus::Running,
            vec![
                TaskStatus::PendingApproval,
                TaskStatus::NeedsWork,
                TaskStatus::Error,
                TaskStatus::Rejected,
            ],
        );

        for reviewable in [TaskStatus::PendingApproval, TaskStatus::NeedsWork, TaskStatus::Error] {
            valid_transitions.insert(reviewable, vec![TaskStatus::Approved, TaskStatus::Rejected]);
        }

        valid_transitions.insert(TaskStatus::Approved, vec![]);
        valid_transitions.insert(TaskStatus::Rejected, vec![]);

        Self { valid_transitions }
    }

    /// Shared instance.
    pub fn standard() -> &'static LifecycleRules {
        static RULES: OnceLock<LifecycleRules> = OnceLock::new();
        RULES.get_or_init(LifecycleRules::new)
    }

    pub fn can_transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.valid_transitions
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    /// Move `task` to `to`, or fail with `InvalidTransition`.
    pub fn transition(&self, task: &mut Task, to: TaskStatus) -> Result<(), TaskError> {
        if !self.can_transition(task.status, to) {
            return Err(TaskError::InvalidTransition {
                from: task.status.to_string(),
                to: to.to_string(),
            });
        }
        task.status = to;
        Ok(())
    }
}

impl Default for LifecycleRules {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Document-level operations
// ============================================================================

/// Add a new `running` task to the document and return its id.
pub(crate) fn insert_task(
    doc: &mut Snapshot,
    request: NewTask,
    registry_default: &str,
) -> Result<String, TaskError> {
    if request.prompt.trim().is_empty() {
        return Err(TaskError::EmptyPrompt);
    }
    let provider = doc.settings.provider_or(registry_default).to_string();
    let mut task = Task::new(request, &provider, &doc.settings.default_model);
    task.log(format!("created ({}) on provider {}", task.source, task.provider));
    let id = task.id.clone();
    doc.tasks.push(task);
    Ok(id)
}

/// Approve a task and put its snapshot at the front of the stream.
pub(crate) fn commit_to_stream(
    doc: &mut Snapshot,
    task_id: &str,
    reason: ApprovalReason,
    now: DateTime<Utc>,
) -> Result<StreamEntry, TaskError> {
    let task = doc
        .find_task_mut(task_id)
        .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

    if task.status == TaskStatus::Approved {
        return Err(TaskError::AlreadyApproved(task_id.to_string()));
    }
    LifecycleRules::standard().transition(task, TaskStatus::Approved)?;

    task.approved_at = Some(now);
    match (reason, task.score) {
        (ApprovalReason::Auto, Some(score)) => {
            task.log(format!("auto-approved at score {}", score))
        }
        _ => task.log(format!("approved ({})", reason)),
    }

    let entry = StreamEntry::from_task(task, now, reason);
    doc.stream.insert(0, entry.clone());
    Ok(entry)
}

/// Prompt for the child of a rejected task.
pub fn retry_prompt(root: &str, feedback: Option<&str>) -> String {
    let feedback = feedback
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or("none");
    format!("{}\n\nPrevious rejection feedback: {}", root, feedback)
}

fn reject_in(
    doc: &mut Snapshot,
    task_id: &str,
    feedback: Option<String>,
    registry_default: &str,
) -> Result<String, TaskError> {
    let task = doc
        .find_task_mut(task_id)
        .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
    LifecycleRules::standard().transition(task, TaskStatus::Rejected)?;

    task.feedback = feedback.clone();
    task.log("rejected by operator");

    let child = NewTask {
        prompt: retry_prompt(&task.original_prompt, feedback.as_deref()),
        original_prompt: Some(task.original_prompt.clone()),
        provider: Some(task.provider.clone()),
        model: task.model.clone(),
        source: TaskSource::Retry,
        parent_id: Some(task.id.clone()),
    };

    if let Some(text) = feedback.as_deref() {
        doc.wisdom_log.append(text);
    }

    let child_id = insert_task(doc, child, registry_default)?;
    if let Some(child) = doc.find_task_mut(&child_id) {
        child.log(format!("retry of {} carrying rejection feedback", task_id));
    }
    Ok(child_id)
}

// ============================================================================
// Service
// ============================================================================

/// A task whose pipeline has been spawned.
#[derive(Debug)]
pub struct Spawned {
    pub task_id: String,
    /// Resolves to the status the pipeline left the task in.
    pub handle: JoinHandle<Option<TaskStatus>>,
}

/// Creation, execution start, approval, rejection, deletion and reset.
pub struct TaskLifecycle {
    store: StoreHandle,
    engine: Arc<PipelineEngine>,
    registry_default: String,
    metrics: MetricsCollector,
}

impl TaskLifecycle {
    /// `registry_default` is the provider used when settings name none.
    pub fn new(store: StoreHandle, engine: Arc<PipelineEngine>, registry_default: impl Into<String>) -> Self {
        Self {
            store,
            engine,
            registry_default: registry_default.into(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn registry_default(&self) -> &str {
        &self.registry_default
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, TaskError> {
        self.store
            .find_task(task_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    /// Persist a new `running` task without starting it.
    pub async fn create(&self, request: NewTask) -> Result<String, TaskError> {
        let source = request.source;
        let registry_default = self.registry_default.clone();
        let id = self
            .store
            .try_mutate(move |doc| insert_task(doc, request, &registry_default))
            .await?;

        self.metrics.record_task_created(source.as_str());
        tracing::info!(task_id = %id, source = %source, "Task created");
        Ok(id)
    }

    /// Spawn the pipeline for a task without waiting for it.
    pub fn start(&self, task_id: &str) -> JoinHandle<Option<TaskStatus>> {
        let engine = Arc::clone(&self.engine);
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            match engine.run_task(&task_id).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(task_id = %task_id, error = %e, "Pipeline stopped on store failure");
                    None
                }
            }
        })
    }

    /// Create a task and start its pipeline.
    pub async fn submit(&self, request: NewTask) -> Result<Spawned, TaskError> {
        let task_id = self.create(request).await?;
        let handle = self.start(&task_id);
        Ok(Spawned { task_id, handle })
    }

    pub async fn approve(&self, task_id: &str, reason: ApprovalReason) -> Result<StreamEntry, TaskError> {
        let now = Utc::now();
        let entry = self
            .store
            .try_mutate(|doc| commit_to_stream(doc, task_id, reason, now))
            .await?;

        self.metrics.record_task_outcome(TaskStatus::Approved.as_str(), None);
        tracing::info!(task_id = %task_id, reason = %reason, score = ?entry.score, "Task approved");
        Ok(entry)
    }

    /// Reject a task, remember the feedback and start a child task carrying it.
    pub async fn reject(&self, task_id: &str, feedback: Option<String>) -> Result<Spawned, TaskError> {
        let registry_default = self.registry_default.clone();
        let child_id = self
            .store
            .try_mutate(|doc| reject_in(doc, task_id, feedback, &registry_default))
            .await?;

        self.metrics.record_task_outcome(TaskStatus::Rejected.as_str(), None);
        self.metrics.record_task_created(TaskSource::Retry.as_str());
        tracing::info!(task_id = %task_id, child_id = %child_id, "Task rejected, retry started");

        let handle = self.start(&child_id);
        Ok(Spawned {
            task_id: child_id,
            handle,
        })
    }

    /// Hard-remove a task. Its stream entry, if any, is kept.
    pub async fn delete(&self, task_id: &str) -> Result<(), TaskError> {
        self.store
            .try_mutate(|doc| {
                let before = doc.tasks.len();
                doc.tasks.retain(|t| t.id != task_id);
                if doc.tasks.len() == before {
                    return Err(TaskError::NotFound(task_id.to_string()));
                }
                Ok(())
            })
            .await?;
        tracing::info!(task_id = %task_id, "Task deleted");
        Ok(())
    }

    pub async fn delete_stream_entry(&self, entry_id: &str) -> Result<(), TaskError> {
        self.store
            .try_mutate(|doc| {
                let before = doc.stream.len();
                doc.stream.retain(|e| e.id != entry_id);
                if doc.stream.len() == before {
                    return Err(TaskError::StreamEntryNotFound(entry_id.to_string()));
                }
                Ok(())
            })
            .await?;
        tracing::info!(entry_id = %entry_id, "Stream entry deleted");
        Ok(())
    }

    /// Clear tasks and the stream. Wisdom, settings and autopilot state survive.
    pub async fn reset(&self) -> Result<(), TaskError> {
        let (tasks, entries) = self
            .store
            .mutate(|doc| {
                let counts = (doc.tasks.len(), doc.stream.len());
                doc.tasks.clear();
                doc.stream.clear();
                counts
            })
            .await?;
        tracing::warn!(tasks = tasks, entries = entries, "Store reset");
        Ok(())
    }
}
