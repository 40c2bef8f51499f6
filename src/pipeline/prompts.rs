//! System instructions and user-content builders for each completion role.

use crate::task::{Architecture, FileCritique, FileSpec, GeneratedFile};

pub const DESIGN_SYSTEM: &str = r#"You are a senior software architect. Turn the requirement into a concrete, buildable design.

Respond with ONLY a JSON object of this shape:
{
  "projectName": "kebab-case-name",
  "description": "one paragraph",
  "techStack": {"runtime": "", "framework": "", "database": "", "auth": "", "testing": "", "other": []},
  "architecture": "how the pieces fit together",
  "dataModels": [{"name": "", "fields": {"field": "type"}, "relations": []}],
  "apiEndpoints": [{"method": "GET", "path": "/", "auth": false, "description": ""}],
  "files": [{"path": "src/index.js", "purpose": "", "exports": [], "dependencies": [], "priority": 1}],
  "environmentVars": [],
  "implementationNotes": ""
}

Rules:
- List every file needed to run the project; lower priority numbers are built first.
- Keep the design minimal but complete.
- Honour every constraint listed under "Constraints from past rejections"."#;

pub const IMPLEMENT_SYSTEM: &str = r#"You are a meticulous senior engineer. Write the complete contents of exactly one file.

Rules:
- Output ONLY the file contents. No explanations, no markdown fences.
- No placeholders or TODO stubs; every function must be implemented.
- Match the exports and dependencies the design assigns to this file.
- Validate inputs and handle failure paths explicitly."#;

pub const CRITIQUE_SYSTEM: &str = r#"You are a strict code reviewer. Score one file against its purpose in the design.

Respond with ONLY a JSON object:
{
  "score": 0-100,
  "summary": "one sentence",
  "critical": ["bugs that break behaviour"],
  "major": ["significant defects"],
  "minor": ["style or clarity issues"],
  "security": ["security problems"],
  "missing": ["required functionality that is absent"]
}

Scoring: 95+ production ready, 85-94 solid with minor issues, 70-84 notable defects, below 70 broken or incomplete."#;

pub const REFINE_SYSTEM: &str = r#"You are a senior engineer fixing a file after code review.

Rules:
- Fix every critical, security and major finding; address minor ones where cheap.
- Keep the file's exports and purpose unchanged.
- Output ONLY the complete corrected file contents. No explanations, no markdown fences."#;

pub const INTEGRATE_SYSTEM: &str = r#"You are a software integrator. Check whether the files of one project work together.

Respond with ONLY a JSON object:
{
  "overallScore": 0-100,
  "compatible": true,
  "issues": [{"file": "", "other": "", "problem": ""}],
  "missing": ["files or pieces the project still needs"],
  "envVars": ["environment variables the code reads"],
  "summary": "one paragraph"
}

Set "compatible" to false only when imports, exports or contracts between files do not line up."#;

/// Design request: the requirement plus the wisdom window.
pub fn design_prompt(requirement: &str, wisdom: &[String]) -> String {
    let constraints = if wisdom.is_empty() {
        "none".to_string()
    } else {
        wisdom
            .iter()
            .map(|w| format!("- {}", w))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Requirement:\n{}\n\nConstraints from past rejections:\n{}",
        requirement, constraints
    )
}

fn design_overview(arch: &Architecture) -> String {
    format!(
        "Project: {}\nDescription: {}\nArchitecture: {}\nTech stack: {}",
        arch.project_name,
        arch.description,
        arch.architecture,
        arch.tech_stack.summary()
    )
}

/// Implementation request for one artifact.
pub fn implement_prompt(arch: &Architecture, spec: &FileSpec, siblings: &[String]) -> String {
    let mut out = design_overview(arch);
    out.push_str(&format!("\n\nFile: {}\nPurpose: {}", spec.path, spec.purpose));
    if !spec.exports.is_empty() {
        out.push_str(&format!("\nExports: {}", spec.exports.join(", ")));
    }
    if !spec.dependencies.is_empty() {
        out.push_str(&format!("\nDepends on: {}", spec.dependencies.join(", ")));
    }
    if !arch.environment_vars.is_empty() {
        out.push_str(&format!(
            "\nEnvironment variables: {}",
            arch.environment_vars.join(", ")
        ));
    }
    if !siblings.is_empty() {
        out.push_str(&format!("\nOther files in the project: {}", siblings.join(", ")));
    }
    if !arch.implementation_notes.is_empty() {
        out.push_str(&format!("\n\nImplementation notes:\n{}", arch.implementation_notes));
    }
    out
}

/// Review request for one artifact.
pub fn critique_prompt(arch: &Architecture, file: &GeneratedFile) -> String {
    format!(
        "{}\n\nFile: {}\nPurpose: {}\n\n```\n{}\n```",
        design_overview(arch),
        file.path,
        file.purpose,
        file.code
    )
}

/// Fix request for one artifact, carrying its last critique.
pub fn refine_prompt(arch: &Architecture, file: &GeneratedFile, critique: &FileCritique) -> String {
    let findings = critique.findings();
    let findings = if findings.is_empty() {
        "- (no itemised findings)".to_string()
    } else {
        findings
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "{}\n\nFile: {}\nPurpose: {}\nReview score: {}\nReview summary: {}\nFindings:\n{}\n\nCurrent contents:\n```\n{}\n```",
        design_overview(arch),
        file.path,
        file.purpose,
        critique.score,
        critique.summary,
        findings,
        file.code
    )
}

/// Integration request over every artifact, each truncated to `snippet_chars`.
pub fn integrate_prompt(arch: &Architecture, files: &[GeneratedFile], snippet_chars: usize) -> String {
    let mut out = design_overview(arch);
    out.push_str("\n\nFiles:");
    for file in files {
        out.push_str(&format!(
            "\n\n### {} ({})\n```\n{}\n```",
            file.path,
            file.purpose,
            truncate_chars(&file.code, snippet_chars)
        ));
    }
    out
}

/// First `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
