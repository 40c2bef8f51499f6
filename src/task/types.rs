//! Persisted data model for tasks, artifacts and the approved stream.
//!
//! Every type here serializes as camelCase JSON so the document file stays
//! readable by the operator UI.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::lenient::{lenient_bool, lenient_i64, null_as_default, number_or_numeric_string};

/// Prefix written into an artifact whose implementation call failed.
pub const GENERATION_FAILED_PREFIX: &str = "// GENERATION FAILED:";

/// Generate a task id of the form `task-{unix_millis}-{8 hex}`.
pub fn new_task_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("task-{}-{}", millis, &suffix[..8])
}

// ============================================================================
// Status and provenance
// ============================================================================

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    PendingApproval,
    NeedsWork,
    Approved,
    Rejected,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::PendingApproval => "pending_approval",
            TaskStatus::NeedsWork => "needs_work",
            TaskStatus::Approved => "approved",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Error => "error",
        }
    }

    /// Tasks that count against the autopilot concurrency cap.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::PendingApproval)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Approved | TaskStatus::Rejected)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who created a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    #[default]
    Manual,
    Autopilot,
    #[serde(alias = "reject-regenerate")]
    Retry,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Manual => "manual",
            TaskSource::Autopilot => "autopilot",
            TaskSource::Retry => "retry",
        }
    }
}

impl fmt::Display for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task entered the approved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalReason {
    #[serde(alias = "approved")]
    Manual,
    #[serde(alias = "autopilot")]
    Auto,
}

impl fmt::Display for ApprovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalReason::Manual => f.write_str("manual"),
            ApprovalReason::Auto => f.write_str("auto"),
        }
    }
}

// ============================================================================
// Design output
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TechStack {
    #[serde(deserialize_with = "null_as_default")]
    pub runtime: String,
    #[serde(deserialize_with = "null_as_default")]
    pub framework: String,
    #[serde(deserialize_with = "null_as_default")]
    pub database: String,
    #[serde(deserialize_with = "null_as_default")]
    pub auth: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other: Option<Vec<String>>,
}

impl TechStack {
    /// One-line summary used in prompts.
    pub fn summary(&self) -> String {
        let mut parts: Vec<&str> = [
            self.runtime.as_str(),
            self.framework.as_str(),
            self.database.as_str(),
            self.auth.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
        if let Some(testing) = self.testing.as_deref() {
            parts.push(testing);
        }
        if let Some(other) = &self.other {
            parts.extend(other.iter().map(String::as_str));
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataModel {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub fields: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub relations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiEndpoint {
    #[serde(deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub auth: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
}

/// One artifact the design asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSpec {
    #[serde(deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub purpose: String,
    #[serde(deserialize_with = "null_as_default")]
    pub exports: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub priority: i64,
}

/// Structured design produced by the first pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Architecture {
    #[serde(deserialize_with = "null_as_default")]
    pub project_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tech_stack: TechStack,
    #[serde(deserialize_with = "null_as_default")]
    pub architecture: String,
    #[serde(deserialize_with = "null_as_default")]
    pub data_models: Vec<DataModel>,
    #[serde(deserialize_with = "null_as_default")]
    pub api_endpoints: Vec<ApiEndpoint>,
    #[serde(deserialize_with = "null_as_default")]
    pub files: Vec<FileSpec>,
    #[serde(deserialize_with = "null_as_default")]
    pub environment_vars: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub implementation_notes: String,
}

impl Architecture {
    /// File specs ordered by ascending priority, capped at `max_files`.
    ///
    /// Specs without a path are skipped. The sort is stable, so specs sharing
    /// a priority keep design order.
    pub fn planned_files(&self, max_files: usize) -> Vec<FileSpec> {
        let mut files: Vec<FileSpec> = self
            .files
            .iter()
            .filter(|f| !f.path.trim().is_empty())
            .cloned()
            .collect();
        files.sort_by_key(|f| f.priority);
        files.truncate(max_files);
        files
    }

    /// Whether the design names at least one file with a path.
    pub fn has_files(&self) -> bool {
        self.files.iter().any(|f| !f.path.trim().is_empty())
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// Structured critique of one artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCritique {
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub critical: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub major: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub minor: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub security: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub missing: Vec<String>,
}

impl FileCritique {
    /// Critique produced without a model call.
    pub fn synthetic(score: f64, summary: impl Into<String>) -> Self {
        Self {
            score,
            summary: summary.into(),
            ..Self::default()
        }
    }

    /// Every finding, most severe first, as prompt-ready bullet lines.
    pub fn findings(&self) -> Vec<String> {
        let groups = [
            ("critical", &self.critical),
            ("security", &self.security),
            ("major", &self.major),
            ("missing", &self.missing),
            ("minor", &self.minor),
        ];
        groups
            .into_iter()
            .flat_map(|(label, items)| items.iter().map(move |item| format!("[{}] {}", label, item)))
            .collect()
    }
}

/// One generated artifact owned by a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFile {
    pub path: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub critique: Option<FileCritique>,
    #[serde(default)]
    pub z_depth: u32,
    #[serde(default)]
    pub refined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratedFile {
    pub fn generated(spec: &FileSpec, code: String) -> Self {
        Self {
            path: spec.path.clone(),
            purpose: spec.purpose.clone(),
            code,
            score: None,
            critique: None,
            z_depth: 1,
            refined: false,
            error: None,
        }
    }

    /// Artifact whose implementation call failed; carries the sentinel content.
    pub fn failed(spec: &FileSpec, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            code: format!("{} {}", GENERATION_FAILED_PREFIX, reason),
            error: Some(reason),
            ..Self::generated(spec, String::new())
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some() || self.code.starts_with(GENERATION_FAILED_PREFIX)
    }
}

/// A cross-artifact compatibility problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationIssue {
    #[serde(deserialize_with = "null_as_default")]
    pub file: String,
    #[serde(deserialize_with = "null_as_default")]
    pub other: String,
    #[serde(deserialize_with = "null_as_default")]
    pub problem: String,
}

/// Cross-artifact integration report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationReport {
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub overall_score: f64,
    #[serde(deserialize_with = "lenient_bool")]
    pub compatible: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issues: Vec<IntegrationIssue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub missing: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub env_vars: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
}

// ============================================================================
// Task
// ============================================================================

/// A unit of work driven through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub prompt: String,
    pub original_prompt: String,
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub z_depth: u32,
    #[serde(default)]
    pub w_constraints: Vec<String>,
    #[serde(default)]
    pub architecture: Option<Architecture>,
    #[serde(default)]
    pub files: Vec<GeneratedFile>,
    #[serde(default)]
    pub integration: Option<IntegrationReport>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub thinking_log: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub source: TaskSource,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Everything needed to create a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub prompt: String,
    pub original_prompt: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub source: TaskSource,
    pub parent_id: Option<String>,
}

impl NewTask {
    pub fn manual(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

impl Task {
    /// Build a fresh `running` task. Empty provider or model fall back to the given defaults.
    pub fn new(request: NewTask, default_provider: &str, default_model: &str) -> Self {
        let provider = request
            .provider
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| default_provider.to_string());
        let model = request
            .model
            .filter(|m| !m.trim().is_empty())
            .or_else(|| (!default_model.is_empty()).then(|| default_model.to_string()));
        let original_prompt = request
            .original_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| request.prompt.clone());

        Self {
            id: new_task_id(),
            prompt: request.prompt,
            original_prompt,
            provider,
            model,
            status: TaskStatus::Running,
            z_depth: 0,
            w_constraints: Vec::new(),
            architecture: None,
            files: Vec::new(),
            integration: None,
            score: None,
            diff: None,
            thinking_log: Vec::new(),
            created_at: Utc::now(),
            approved_at: None,
            parent_id: request.parent_id,
            source: request.source,
            feedback: None,
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.thinking_log.push(line.into());
    }

    /// Lowest artifact score, `None` when nothing has been critiqued.
    pub fn min_file_score(&self) -> Option<f64> {
        self.files
            .iter()
            .filter_map(|f| f.score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))))
    }
}

// ============================================================================
// Stream and settings
// ============================================================================

/// Immutable snapshot of an approved task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tech_stack: TechStack,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub z_depth: u32,
    #[serde(default)]
    pub file_count: usize,
    #[serde(default)]
    pub files: Vec<GeneratedFile>,
    #[serde(default)]
    pub architecture: Option<Architecture>,
    #[serde(default)]
    pub integration: Option<IntegrationReport>,
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    pub approved_at: DateTime<Utc>,
    pub reason: ApprovalReason,
}

impl StreamEntry {
    pub fn from_task(task: &Task, approved_at: DateTime<Utc>, reason: ApprovalReason) -> Self {
        let (project_name, description, tech_stack) = match &task.architecture {
            Some(a) => (a.project_name.clone(), a.description.clone(), a.tech_stack.clone()),
            None => (String::new(), String::new(), TechStack::default()),
        };
        Self {
            id: task.id.clone(),
            title: task.prompt.clone(),
            project_name,
            description,
            tech_stack,
            score: task.score,
            z_depth: task.z_depth,
            file_count: task.files.len(),
            files: task.files.clone(),
            architecture: task.architecture.clone(),
            integration: task.integration.clone(),
            provider: task.provider.clone(),
            model: task.model.clone(),
            approved_at,
            reason,
        }
    }
}

/// Operator preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Empty means the provider registry default.
    pub default_provider: String,
    pub default_model: String,
    pub auto_approve: bool,
    pub auto_approve_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_provider: String::new(),
            default_model: String::new(),
            auto_approve: false,
            auto_approve_threshold: 93.0,
        }
    }
}

/// Partial settings update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub default_provider: Option<String>,
    pub default_model: Option<String>,
    pub auto_approve: Option<bool>,
    pub auto_approve_threshold: Option<f64>,
}

impl Settings {
    /// Provider used for new tasks, falling back to `registry_default`.
    pub fn provider_or<'a>(&'a self, registry_default: &'a str) -> &'a str {
        if self.default_provider.trim().is_empty() {
            registry_default
        } else {
            &self.default_provider
        }
    }

    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(provider) = patch.default_provider.filter(|p| !p.trim().is_empty()) {
            self.default_provider = provider;
        }
        if let Some(model) = patch.default_model {
            self.default_model = model;
        }
        if let Some(auto) = patch.auto_approve {
            self.auto_approve = auto;
        }
        if let Some(threshold) = patch.auto_approve_threshold {
            self.auto_approve_threshold = threshold.clamp(1.0, 100.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(path: &str, priority: i64) -> FileSpec {
        FileSpec {
            path: path.to_string(),
            purpose: format!("{} purpose", path),
            priority,
            ..FileSpec::default()
        }
    }

    #[test]
    fn test_task_id_format() {
        let id = new_task_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "task");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_task_id(), new_task_id());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::PendingApproval).unwrap(),
            "\"pending_approval\""
        );
        let status: TaskStatus = serde_json::from_str("\"needs_work\"").unwrap();
        assert_eq!(status, TaskStatus::NeedsWork);
        assert!(TaskStatus::Running.is_active());
        assert!(TaskStatus::PendingApproval.is_active());
        assert!(!TaskStatus::NeedsWork.is_active());
        assert!(TaskStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_legacy_source_and_reason_aliases() {
        let source: TaskSource = serde_json::from_str("\"reject-regenerate\"").unwrap();
        assert_eq!(source, TaskSource::Retry);
        let reason: ApprovalReason = serde_json::from_str("\"autopilot\"").unwrap();
        assert_eq!(reason, ApprovalReason::Auto);
        assert_eq!(serde_json::to_string(&ApprovalReason::Auto).unwrap(), "\"auto\"");
    }

    #[test]
    fn test_planned_files_sorted_and_capped() {
        let arch = Architecture {
            files: vec![spec("c.js", 3), spec("a.js", 1), spec("b.js", 2), spec("a2.js", 1)],
            ..Architecture::default()
        };
        let planned = arch.planned_files(3);
        let paths: Vec<&str> = planned.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.js", "a2.js", "b.js"]);
    }

    #[test]
    fn test_architecture_defaults_missing_fields() {
        let arch: Architecture =
            serde_json::from_str(r#"{"projectName":"counter","files":[{"path":"index.js"}]}"#)
                .unwrap();
        assert_eq!(arch.project_name, "counter");
        assert_eq!(arch.files.len(), 1);
        assert_eq!(arch.files[0].priority, 0);
        assert!(arch.data_models.is_empty());
    }

    #[test]
    fn test_architecture_tolerates_null_lists_and_float_priority() {
        let raw = r#"{
            "projectName": "counter",
            "techStack": null,
            "dataModels": null,
            "environmentVars": null,
            "files": [
                {"path": "src/index.js", "purpose": null, "dependencies": null, "exports": null, "priority": 2.0},
                {"path": "src/counter.js", "priority": 1},
                {"path": null, "priority": "0"}
            ]
        }"#;
        let arch: Architecture = serde_json::from_str(raw).unwrap();
        assert_eq!(arch.tech_stack, TechStack::default());
        assert!(arch.data_models.is_empty());
        assert_eq!(arch.files[0].priority, 2);
        assert!(arch.files[0].dependencies.is_empty());
        assert_eq!(arch.files[0].purpose, "");
        assert!(arch.has_files());

        let planned = arch.planned_files(10);
        let paths: Vec<&str> = planned.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/counter.js", "src/index.js"]);
    }

    #[test]
    fn test_architecture_with_only_blank_paths_has_no_files() {
        let arch: Architecture =
            serde_json::from_str(r#"{"files":[{"path":"  "},{"purpose":"x"}]}"#).unwrap();
        assert!(!arch.has_files());
        assert!(arch.planned_files(5).is_empty());
    }

    #[test]
    fn test_critique_tolerates_null_findings() {
        let critique: FileCritique = serde_json::from_str(
            r#"{"score":"88","summary":null,"critical":null,"major":["slow"],"minor":null}"#,
        )
        .unwrap();
        assert_eq!(critique.score, 88.0);
        assert!(critique.critical.is_empty());
        assert_eq!(critique.major, vec!["slow".to_string()]);
        assert!(serde_json::from_str::<FileCritique>(r#"{"summary":"no score"}"#).is_err());
    }

    #[test]
    fn test_integration_report_tolerates_nulls() {
        let report: IntegrationReport = serde_json::from_str(
            r#"{"overallScore":90,"compatible":true,"issues":null,"missing":null,"summary":null}"#,
        )
        .unwrap();
        assert!(report.compatible);
        assert!(report.issues.is_empty());
        assert_eq!(report.summary, "");
    }

    #[test]
    fn test_failed_file_sentinel() {
        let file = GeneratedFile::failed(&spec("index.js", 1), "timeout");
        assert_eq!(file.code, "// GENERATION FAILED: timeout");
        assert_eq!(file.error.as_deref(), Some("timeout"));
        assert!(file.is_failed());
        assert!(!GeneratedFile::generated(&spec("a.js", 1), "let x = 1;".into()).is_failed());
    }

    #[test]
    fn test_critique_findings_order() {
        let critique = FileCritique {
            score: 70.0,
            minor: vec!["naming".into()],
            critical: vec!["crash on empty input".into()],
            ..FileCritique::default()
        };
        assert_eq!(
            critique.findings(),
            vec!["[critical] crash on empty input", "[minor] naming"]
        );
    }

    #[test]
    fn test_task_new_applies_defaults() {
        let task = Task::new(NewTask::manual("build a counter"), "gemini", "");
        assert_eq!(task.provider, "gemini");
        assert_eq!(task.model, None);
        assert_eq!(task.original_prompt, "build a counter");
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.score, None);

        let request = NewTask::manual("x")
            .with_provider(Some("lmstudio".into()))
            .with_model(Some(String::new()));
        let task = Task::new(request, "openai", "gpt-4o");
        assert_eq!(task.provider, "lmstudio");
        assert_eq!(task.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_task_camel_case_round_trip_keys() {
        let task = Task::new(NewTask::manual("x"), "openai", "");
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("originalPrompt").is_some());
        assert!(value.get("zDepth").is_some());
        assert!(value.get("thinkingLog").is_some());
        assert_eq!(value["source"], "manual");
    }

    #[test]
    fn test_min_file_score() {
        let mut task = Task::new(NewTask::manual("x"), "openai", "");
        assert_eq!(task.min_file_score(), None);
        let mut a = GeneratedFile::generated(&spec("a", 1), String::new());
        a.score = Some(90.0);
        let mut b = GeneratedFile::generated(&spec("b", 2), String::new());
        b.score = Some(72.0);
        task.files = vec![a, b];
        assert_eq!(task.min_file_score(), Some(72.0));
    }

    #[test]
    fn test_stream_entry_from_task() {
        let mut task = Task::new(NewTask::manual("build a counter"), "openai", "");
        task.architecture = Some(Architecture {
            project_name: "counter".into(),
            ..Architecture::default()
        });
        task.score = Some(99.0);
        task.z_depth = 2;
        let entry = StreamEntry::from_task(&task, Utc::now(), ApprovalReason::Manual);
        assert_eq!(entry.id, task.id);
        assert_eq!(entry.title, "build a counter");
        assert_eq!(entry.project_name, "counter");
        assert_eq!(entry.score, Some(99.0));
        assert_eq!(entry.file_count, 0);
    }

    #[test]
    fn test_settings_patch() {
        let mut settings = Settings::default();
        settings.apply(SettingsPatch {
            auto_approve: Some(true),
            auto_approve_threshold: Some(150.0),
            default_provider: Some("  ".into()),
            ..SettingsPatch::default()
        });
        assert!(settings.auto_approve);
        assert_eq!(settings.auto_approve_threshold, 100.0);
        assert_eq!(settings.default_provider, "");
        assert_eq!(settings.provider_or("gemini"), "gemini");

        settings.apply(SettingsPatch {
            default_provider: Some("lmstudio".into()),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.provider_or("gemini"), "lmstudio");
    }
}
