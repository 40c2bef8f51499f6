//! The per-task pipeline: design, implement, critique/refine, integrate, finalize.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use super::config::PipelineConfig;
use super::prompts;
use crate::error::{LlmError, StoreError};
use crate::llm::{CompletionGateway, CompletionRequest, CompletionRole};
use crate::metrics::MetricsCollector;
use crate::quality::{GateVerdict, QualityGate, ScoreSummary};
use crate::storage::StoreHandle;
use crate::task::lifecycle::{commit_to_stream, LifecycleRules};
use crate::task::{
    ApprovalReason, Architecture, GeneratedFile, IntegrationReport, Task, TaskStatus,
};
use crate::utils::{decode_structured, strip_code_fences, Decoded};

/// Errors that end a pipeline run early.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The design stage produced nothing usable.
    #[error("Design failed: {0}")]
    Design(String),

    /// The task was deleted while the pipeline was running.
    #[error("Task was removed during the run")]
    TaskRemoved,

    /// Persistence failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Provider and model the task's calls are routed to.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub task_id: String,
    pub provider: String,
    pub model: String,
}

/// Drives one task from `running` to `pending_approval`, `needs_work`,
/// `approved` or `error`.
///
/// Every stage appends to the task's thinking log and persists before the
/// next completion call, so an interrupted run leaves an inspectable record.
pub struct PipelineEngine {
    pub(crate) store: StoreHandle,
    pub(crate) gateway: Arc<dyn CompletionGateway>,
    pub(crate) config: PipelineConfig,
    pub(crate) gate: QualityGate,
    metrics: MetricsCollector,
}

impl PipelineEngine {
    pub fn new(store: StoreHandle, gateway: Arc<dyn CompletionGateway>, config: PipelineConfig) -> Self {
        let gate = QualityGate::new(config.gate);
        Self {
            store,
            gateway,
            config,
            gate,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Run the whole pipeline for `task_id`.
    ///
    /// Returns the status the task was left in, or `None` if the task does
    /// not exist or was deleted mid-run. Stage failures are recorded on the
    /// task as `error`; only store failures are returned.
    pub async fn run_task(&self, task_id: &str) -> Result<Option<TaskStatus>, StoreError> {
        tracing::info!(task_id = %task_id, "Pipeline started");

        match self.execute(task_id).await {
            Ok(status) => Ok(Some(status)),
            Err(PipelineError::TaskRemoved) => {
                tracing::info!(task_id = %task_id, "Task removed mid-run; pipeline stopped");
                Ok(None)
            }
            Err(PipelineError::Store(e)) => {
                tracing::error!(task_id = %task_id, error = %e, "Store failure during pipeline");
                Err(e)
            }
            Err(failure) => self.record_failure(task_id, &failure).await,
        }
    }

    async fn record_failure(
        &self,
        task_id: &str,
        failure: &PipelineError,
    ) -> Result<Option<TaskStatus>, StoreError> {
        tracing::warn!(task_id = %task_id, error = %failure, "Pipeline failed");
        let message = failure.to_string();

        let status = self
            .store
            .update_task(task_id, move |task| {
                task.log(format!("error: {}", message));
                if LifecycleRules::standard()
                    .transition(task, TaskStatus::Error)
                    .is_err()
                {
                    task.log(format!("status left at {} (changed by operator)", task.status));
                }
                task.status
            })
            .await?;

        if status == Some(TaskStatus::Error) {
            self.metrics.record_task_outcome(TaskStatus::Error.as_str(), None);
        }
        Ok(status)
    }

    async fn execute(&self, task_id: &str) -> Result<TaskStatus, PipelineError> {
        let snapshot = self.store.snapshot().await?;
        let task = snapshot
            .find_task(task_id)
            .ok_or(PipelineError::TaskRemoved)?;
        let ctx = RunContext {
            task_id: task_id.to_string(),
            provider: task.provider.clone(),
            model: task.model.clone().unwrap_or_default(),
        };
        let requirement = task.prompt.clone();
        let wisdom = snapshot.wisdom_log.recent(self.config.wisdom_window);
        drop(snapshot);

        // Design
        let injected = wisdom.clone();
        self.persist(&ctx, move |task| {
            task.log(format!("wisdom: {} constraint(s) injected", injected.len()));
            task.w_constraints = injected;
            task.log("design: requesting architecture");
        })
        .await?;

        let architecture = self.design(&ctx, &requirement, &wisdom).await?;
        let planned = architecture.planned_files(self.config.max_files);
        let designed = architecture.files.len();
        let summary = format!(
            "design: {} with {} file(s) planned{}",
            if architecture.project_name.is_empty() {
                "unnamed project"
            } else {
                architecture.project_name.as_str()
            },
            planned.len(),
            if designed > planned.len() {
                format!(" (capped from {})", designed)
            } else {
                String::new()
            }
        );
        let stored = architecture.clone();
        self.persist(&ctx, move |task| {
            task.architecture = Some(stored);
            task.log(summary);
        })
        .await?;

        // Implement
        let siblings: Vec<String> = planned.iter().map(|f| f.path.clone()).collect();
        let mut files: Vec<GeneratedFile> = Vec::with_capacity(planned.len());
        for spec in &planned {
            let others: Vec<String> = siblings.iter().filter(|p| **p != spec.path).cloned().collect();
            let user = prompts::implement_prompt(&architecture, spec, &others);
            let (file, line) = match self.call(&ctx, CompletionRole::Implement, user).await {
                Ok(text) => {
                    let code = strip_code_fences(&text);
                    if code.trim().is_empty() {
                        (
                            GeneratedFile::failed(spec, "empty file content"),
                            format!("implement: {} failed: empty file content", spec.path),
                        )
                    } else {
                        let line = format!("implement: {} ({} chars)", spec.path, code.len());
                        (GeneratedFile::generated(spec, code), line)
                    }
                }
                Err(e) => {
                    tracing::warn!(task_id = %ctx.task_id, path = %spec.path, error = %e, "Implementation failed");
                    (
                        GeneratedFile::failed(spec, e.to_string()),
                        format!("implement: {} failed: {}", spec.path, e),
                    )
                }
            };
            files.push(file);
            let current = files.clone();
            self.persist(&ctx, move |task| {
                task.files = current;
                task.log(line);
            })
            .await?;
        }

        // Critique / refine
        let depth = self.refine_loop(&ctx, &architecture, &mut files).await?;
        let scores = ScoreSummary::of(&files);

        // Integrate
        let integration = self.integrate(&ctx, &architecture, &files).await?;

        // Finalize
        self.finalize(&ctx, files, depth, scores, integration).await
    }

    async fn design(
        &self,
        ctx: &RunContext,
        requirement: &str,
        wisdom: &[String],
    ) -> Result<Architecture, PipelineError> {
        let user = prompts::design_prompt(requirement, wisdom);
        let text = self
            .call(ctx, CompletionRole::Design, user)
            .await
            .map_err(|e| PipelineError::Design(format!("completion failed: {}", e)))?;

        let architecture = match decode_structured::<Architecture>(&text) {
            Decoded::Structured(architecture) => architecture,
            Decoded::Malformed(reason) => {
                return Err(PipelineError::Design(format!("malformed output: {}", reason)))
            }
        };

        if !architecture.has_files() {
            return Err(PipelineError::Design("design lists no files".to_string()));
        }
        Ok(architecture)
    }

    async fn integrate(
        &self,
        ctx: &RunContext,
        architecture: &Architecture,
        files: &[GeneratedFile],
    ) -> Result<Option<IntegrationReport>, PipelineError> {
        if !self.config.run_integration {
            self.persist(ctx, |task| task.log("integrate: skipped"))
                .await?;
            return Ok(None);
        }

        let user =
            prompts::integrate_prompt(architecture, files, self.config.integration_snippet_chars);
        let (report, line) = match self.call(ctx, CompletionRole::Integrate, user).await {
            Ok(text) => match decode_structured::<IntegrationReport>(&text) {
                Decoded::Structured(report) => {
                    let line = format!(
                        "integrate: {} (score {}, {} issue(s))",
                        if report.compatible { "compatible" } else { "incompatible" },
                        report.overall_score,
                        report.issues.len()
                    );
                    (Some(report), line)
                }
                Decoded::Malformed(reason) => (None, format!("integrate: unparseable report: {}", reason)),
            },
            Err(e) => {
                tracing::warn!(task_id = %ctx.task_id, error = %e, "Integration check failed");
                (None, format!("integrate: failed: {}", e))
            }
        };

        let stored = report.clone();
        self.persist(ctx, move |task| {
            task.integration = stored;
            task.log(line);
        })
        .await?;
        Ok(report)
    }

    async fn finalize(
        &self,
        ctx: &RunContext,
        files: Vec<GeneratedFile>,
        depth: u32,
        scores: ScoreSummary,
        integration: Option<IntegrationReport>,
    ) -> Result<TaskStatus, PipelineError> {
        let final_score = self
            .config
            .integration
            .final_score(scores.average, integration.as_ref());
        let verdict = self.gate.evaluate(depth, final_score, scores.min);
        let diff = format!(
            "{} file(s), depth {}, average {:.1}, worst {:.1}, integration {}, final {}",
            files.len(),
            depth,
            scores.average,
            scores.min,
            match &integration {
                Some(r) if r.compatible => "compatible",
                Some(_) => "incompatible",
                None => "skipped",
            },
            final_score
        );
        let task_id = ctx.task_id.clone();
        let now = Utc::now();

        let status = self
            .store
            .mutate(move |doc| {
                let orchestrator = (doc.orchestrator.enabled).then_some(doc.orchestrator.auto_approve_threshold);
                let settings = (doc.settings.auto_approve).then_some(doc.settings.auto_approve_threshold);
                let threshold = orchestrator.or(settings);

                let task = doc.find_task_mut(&task_id)?;
                task.files = files;
                task.z_depth = task.z_depth.max(depth);
                task.integration = integration;
                task.score = Some(final_score);
                task.diff = Some(diff);
                task.log(format!("gate: {}", verdict.describe()));

                if task.status != TaskStatus::Running {
                    task.log(format!(
                        "outcome recorded; status left at {} (changed by operator)",
                        task.status
                    ));
                    return Some(task.status);
                }

                let target = match verdict {
                    GateVerdict::Eligible => TaskStatus::PendingApproval,
                    GateVerdict::Ineligible(_) => TaskStatus::NeedsWork,
                };
                task.status = target;
                task.log(format!("finalize: score {} -> {}", final_score, target));

                if let Some(threshold) = threshold {
                    if target == TaskStatus::PendingApproval && final_score >= threshold {
                        if commit_to_stream(doc, &task_id, ApprovalReason::Auto, now).is_ok() {
                            return Some(TaskStatus::Approved);
                        }
                    }
                }
                Some(target)
            })
            .await?;

        let status = status.ok_or(PipelineError::TaskRemoved)?;
        self.metrics.record_task_outcome(status.as_str(), Some(final_score));
        tracing::info!(
            task_id = %ctx.task_id,
            status = %status,
            score = final_score,
            depth = depth,
            "Pipeline finished"
        );
        Ok(status)
    }

    /// One role-tagged completion with the configured profile.
    pub(crate) async fn call(
        &self,
        ctx: &RunContext,
        role: CompletionRole,
        user: String,
    ) -> Result<String, LlmError> {
        let profile = self.config.roles.get(role);
        self.gateway
            .complete(CompletionRequest {
                role,
                provider: ctx.provider.clone(),
                model: ctx.model.clone(),
                system: profile.system.clone(),
                user,
                temperature: profile.temperature,
                max_tokens: profile.max_tokens,
            })
            .await
    }

    /// Apply a change to the task, failing with `TaskRemoved` if it is gone.
    pub(crate) async fn persist(
        &self,
        ctx: &RunContext,
        change: impl FnOnce(&mut Task) + Send,
    ) -> Result<(), PipelineError> {
        self.store
            .update_task(&ctx.task_id, change)
            .await?
            .ok_or(PipelineError::TaskRemoved)
    }
}
