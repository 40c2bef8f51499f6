//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use polyplex::llm::{CompletionGateway, CompletionRequest, CompletionRole};
use polyplex::pipeline::PipelineConfig;
use polyplex::storage::{MemoryStore, Snapshot, StoreHandle, TaskStore};
use polyplex::{LlmError, Polyplex, StoreError};

/// One recorded gateway call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub role: CompletionRole,
    pub provider: String,
    pub path: Option<String>,
    pub user: String,
}

/// Gateway that answers by role, and per artifact path for the per-file roles.
///
/// The path is read from the `File: <path>` line every per-file prompt carries.
#[derive(Default)]
pub struct ScriptedGateway {
    design: Mutex<Option<String>>,
    code: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    failing_refine: Mutex<HashSet<String>>,
    failing_critique: Mutex<HashSet<String>>,
    malformed_critique: Mutex<HashSet<String>>,
    integration_fails: Mutex<bool>,
    scores: Mutex<HashMap<String, f64>>,
    refined_scores: Mutex<HashMap<String, f64>>,
    integration: Mutex<Option<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Design two files with fixed scores and a compatible integration report.
    pub fn counter() -> Self {
        Self::new()
            .with_design(&[("src/counter.js", 1), ("src/index.js", 2)])
            .with_file("src/counter.js", "export let count = 0;", 96.0)
            .with_file("src/index.js", "import { count } from './counter.js';", 97.0)
            .with_integration(true)
    }

    pub fn with_design(self, files: &[(&str, i64)]) -> Self {
        let files: Vec<serde_json::Value> = files
            .iter()
            .map(|(path, priority)| {
                serde_json::json!({
                    "path": path,
                    "purpose": format!("{} module", path),
                    "exports": [],
                    "dependencies": [],
                    "priority": priority,
                })
            })
            .collect();
        let design = serde_json::json!({
            "projectName": "counter",
            "description": "A tiny counter",
            "techStack": { "runtime": "node" },
            "architecture": "two modules",
            "files": files,
            "environmentVars": [],
            "implementationNotes": "keep it small",
        });
        *self.design.lock().unwrap() = Some(design.to_string());
        self
    }

    pub fn with_raw_design(self, text: &str) -> Self {
        *self.design.lock().unwrap() = Some(text.to_string());
        self
    }

    pub fn with_file(self, path: &str, code: &str, score: f64) -> Self {
        self.code.lock().unwrap().insert(path.to_string(), code.to_string());
        self.scores.lock().unwrap().insert(path.to_string(), score);
        self
    }

    /// Score `path` receives from critiques after it has been refined.
    pub fn with_refined_score(self, path: &str, score: f64) -> Self {
        self.refined_scores.lock().unwrap().insert(path.to_string(), score);
        self
    }

    /// Make Implement fail for `path`.
    pub fn failing(self, path: &str) -> Self {
        self.failing.lock().unwrap().insert(path.to_string());
        self
    }

    /// Make Refine fail for `path` while Implement still succeeds.
    pub fn failing_refine(self, path: &str) -> Self {
        self.failing_refine.lock().unwrap().insert(path.to_string());
        self
    }

    /// Make every Critique of `path` fail.
    pub fn failing_critique(self, path: &str) -> Self {
        self.failing_critique.lock().unwrap().insert(path.to_string());
        self
    }

    /// Answer every Critique of `path` with prose instead of JSON.
    pub fn malformed_critique(self, path: &str) -> Self {
        self.malformed_critique.lock().unwrap().insert(path.to_string());
        self
    }

    /// Make the Integrate call fail.
    pub fn failing_integration(self) -> Self {
        *self.integration_fails.lock().unwrap() = true;
        self
    }

    pub fn with_raw_integration(self, text: &str) -> Self {
        *self.integration.lock().unwrap() = Some(text.to_string());
        self
    }

    pub fn with_integration(self, compatible: bool) -> Self {
        let report = serde_json::json!({
            "overallScore": if compatible { 95 } else { 40 },
            "compatible": compatible,
            "issues": [],
            "missing": [],
            "envVars": [],
            "summary": "checked",
        });
        *self.integration.lock().unwrap() = Some(report.to_string());
        self
    }

    pub fn set_score(&self, path: &str, score: f64) {
        self.scores.lock().unwrap().insert(path.to_string(), score);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, role: CompletionRole, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.role == role && c.path.as_deref() == Some(path))
            .count()
    }

    pub fn count(&self, role: CompletionRole) -> usize {
        self.calls().iter().filter(|c| c.role == role).count()
    }
}

fn file_path(user: &str) -> Option<String> {
    user.lines()
        .find_map(|line| line.strip_prefix("File: "))
        .map(|path| path.trim().to_string())
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let path = file_path(&request.user);
        self.calls.lock().unwrap().push(RecordedCall {
            role: request.role,
            provider: request.provider.clone(),
            path: path.clone(),
            user: request.user.clone(),
        });

        let missing = || LlmError::RequestFailed(format!("no script for {}", request.role));
        match request.role {
            CompletionRole::Design => self.design.lock().unwrap().clone().ok_or_else(missing),
            CompletionRole::Implement | CompletionRole::Refine => {
                let path = path.ok_or_else(missing)?;
                let refused = match request.role {
                    CompletionRole::Refine => self.failing_refine.lock().unwrap().contains(&path),
                    _ => self.failing.lock().unwrap().contains(&path),
                };
                if refused {
                    return Err(LlmError::ApiError {
                        code: 400,
                        message: format!("refused {}", path),
                    });
                }
                let code = self.code.lock().unwrap().get(&path).cloned().ok_or_else(missing)?;
                if request.role == CompletionRole::Refine {
                    if let Some(score) = self.refined_scores.lock().unwrap().get(&path).copied() {
                        self.set_score(&path, score);
                    }
                    return Ok(format!("```js\n{}\n// refined\n```", code));
                }
                Ok(format!("```js\n{}\n```", code))
            }
            CompletionRole::Critique => {
                let path = path.ok_or_else(missing)?;
                if self.failing_critique.lock().unwrap().contains(&path) {
                    return Err(LlmError::RequestFailed(format!("critique of {} timed out", path)));
                }
                if self.malformed_critique.lock().unwrap().contains(&path) {
                    return Ok(format!("{} looks reasonable overall, nice work.", path));
                }
                let score = self.scores.lock().unwrap().get(&path).copied().ok_or_else(missing)?;
                Ok(serde_json::json!({
                    "score": score,
                    "summary": format!("review of {}", path),
                    "minor": ["naming"],
                })
                .to_string())
            }
            CompletionRole::Integrate => {
                if *self.integration_fails.lock().unwrap() {
                    return Err(LlmError::ApiError {
                        code: 503,
                        message: "integration check unavailable".to_string(),
                    });
                }
                self.integration.lock().unwrap().clone().ok_or_else(missing)
            }
        }
    }
}

/// An app over an in-memory store with the given gateway.
pub fn app_with(gateway: Arc<ScriptedGateway>, config: PipelineConfig) -> Polyplex {
    Polyplex::new(StoreHandle::in_memory(), gateway, config, "openai")
}

/// In-memory backend that counts document writes.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for CountingStore {
    async fn read(&self) -> Result<Snapshot, StoreError> {
        self.inner.read().await
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(snapshot).await
    }
}
