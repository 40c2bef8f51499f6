//! Bounded critique/refine loop.
//!
//! Depth starts at 1 after implementation with every artifact critiqued.
//! Each further round refines the weak artifacts and re-critiques all of
//! them, until the gate predicate holds (never before the minimum depth) or
//! the maximum depth is reached.

use super::engine::{PipelineEngine, PipelineError, RunContext};
use super::prompts;
use crate::llm::CompletionRole;
use crate::quality::ScoreSummary;
use crate::task::{Architecture, FileCritique, GeneratedFile};
use crate::utils::{decode_structured, strip_code_fences, Decoded};

impl PipelineEngine {
    /// Run the loop over `files` in place and return the depth reached.
    pub(crate) async fn refine_loop(
        &self,
        ctx: &RunContext,
        architecture: &Architecture,
        files: &mut [GeneratedFile],
    ) -> Result<u32, PipelineError> {
        let mut depth: u32 = 1;
        self.critique_round(ctx, architecture, files, depth).await?;

        loop {
            let scores = ScoreSummary::of(files);
            tracing::debug!(
                task_id = %ctx.task_id,
                depth = depth,
                average = scores.average,
                min = scores.min,
                "Critique round complete"
            );

            if self.gate.should_stop(depth, scores.average, scores.min) {
                let reason = if self.gate.evaluate(depth, scores.average, scores.min).is_eligible() {
                    "quality sufficient"
                } else {
                    "maximum depth reached"
                };
                self.persist(ctx, move |task| {
                    task.log(format!("z{}: loop exit ({})", depth, reason));
                })
                .await?;
                return Ok(depth);
            }

            depth += 1;
            self.refine_round(ctx, architecture, files, depth).await?;
            self.critique_round(ctx, architecture, files, depth).await?;
        }
    }

    /// Critique every artifact, then persist scores, depth and the running score.
    async fn critique_round(
        &self,
        ctx: &RunContext,
        architecture: &Architecture,
        files: &mut [GeneratedFile],
        depth: u32,
    ) -> Result<(), PipelineError> {
        let mut lines = Vec::with_capacity(files.len());
        for file in files.iter_mut() {
            lines.push(self.critique_file(ctx, architecture, file, depth).await);
        }

        let scores = ScoreSummary::of(files);
        let current = files.to_vec();
        self.persist(ctx, move |task| {
            task.files = current;
            task.z_depth = task.z_depth.max(depth);
            task.score = Some(scores.average.round());
            task.thinking_log.extend(lines);
            task.log(format!(
                "z{}: average {:.1}, worst {:.1}",
                depth, scores.average, scores.min
            ));
        })
        .await
    }

    /// Score one artifact. Failed artifacts get 0 without a completion call.
    async fn critique_file(
        &self,
        ctx: &RunContext,
        architecture: &Architecture,
        file: &mut GeneratedFile,
        depth: u32,
    ) -> String {
        if file.is_failed() {
            let reason = file.error.clone().unwrap_or_else(|| "generation failed".to_string());
            file.score = Some(0.0);
            file.critique = Some(FileCritique::synthetic(0.0, format!("not reviewed: {}", reason)));
            return format!("z{} critique: {} = 0 (generation failed)", depth, file.path);
        }

        let fallback = self.config.critique_fallback_score;
        let user = prompts::critique_prompt(architecture, file);
        let critique = match self.call(ctx, CompletionRole::Critique, user).await {
            Ok(text) => match decode_structured::<FileCritique>(&text) {
                Decoded::Structured(mut critique) => {
                    critique.score = critique.score.clamp(0.0, 100.0);
                    critique
                }
                Decoded::Malformed(reason) => {
                    FileCritique::synthetic(fallback, format!("critique unparseable: {}", reason))
                }
            },
            Err(e) => {
                tracing::warn!(task_id = %ctx.task_id, path = %file.path, error = %e, "Critique failed");
                FileCritique::synthetic(fallback, format!("critique failed: {}", e))
            }
        };

        let line = format!(
            "z{} critique: {} = {} ({})",
            depth, file.path, critique.score, critique.summary
        );
        file.score = Some(critique.score);
        file.critique = Some(critique);
        line
    }

    /// Refine every non-failed artifact below the refine threshold.
    async fn refine_round(
        &self,
        ctx: &RunContext,
        architecture: &Architecture,
        files: &mut [GeneratedFile],
        depth: u32,
    ) -> Result<(), PipelineError> {
        let threshold = self.config.refine_threshold;
        let mut lines = Vec::new();

        for file in files.iter_mut() {
            let score = file.score.unwrap_or(0.0);
            if file.is_failed() || score >= threshold {
                continue;
            }

            let critique = file
                .critique
                .clone()
                .unwrap_or_else(|| FileCritique::synthetic(score, "no critique recorded"));
            let user = prompts::refine_prompt(architecture, file, &critique);

            match self.call(ctx, CompletionRole::Refine, user).await {
                Ok(text) => {
                    let code = strip_code_fences(&text);
                    if code.trim().is_empty() {
                        lines.push(format!("z{} refine: {} returned nothing; kept previous", depth, file.path));
                        continue;
                    }
                    file.code = code;
                    file.refined = true;
                    file.z_depth = depth;
                    file.score = None;
                    file.critique = None;
                    lines.push(format!("z{} refine: {} (was {})", depth, file.path, score));
                }
                Err(e) => {
                    tracing::warn!(task_id = %ctx.task_id, path = %file.path, error = %e, "Refine failed");
                    lines.push(format!("z{} refine: {} failed, kept previous: {}", depth, file.path, e));
                }
            }
        }

        if lines.is_empty() {
            lines.push(format!("z{} refine: nothing below {}", depth, threshold));
        }

        let current = files.to_vec();
        self.persist(ctx, move |task| {
            task.files = current;
            task.thinking_log.extend(lines);
        })
        .await
    }
}
