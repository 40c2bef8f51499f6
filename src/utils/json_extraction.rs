//! JSON extraction utilities for parsing LLM responses.
//!
//! Model output is untyped text that may wrap JSON in markdown fences or
//! surround it with prose. Extraction tries, in order:
//! 1. A fenced ```json block
//! 2. Any fenced block containing an object
//! 3. The content itself when it starts with '{'
//! 4. The largest valid object anywhere in the content (later wins ties)
//!
//! [`decode_structured`] layers typed decoding on top and reports failure as
//! a value rather than an error, so each caller decides whether a malformed
//! reply is fatal.
//!
//! ```
//! use polyplex::utils::json_extraction::{decode_structured, Decoded};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Verdict { score: f64 }
//!
//! let reply = "Here you go:\n```json\n{\"score\": 91}\n```";
//! match decode_structured::<Verdict>(reply) {
//!     Decoded::Structured(v) => assert_eq!(v.score, 91.0),
//!     Decoded::Malformed(reason) => panic!("{}", reason),
//! }
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets")]
    Truncated {
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON content found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Result of JSON extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtractionResult {
    /// Successfully extracted valid JSON
    Success(String),
    /// JSON started but never closed (typically a max-tokens cut-off)
    Truncated {
        partial_json: String,
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    /// No JSON-like content found in response
    NotFound,
}

impl JsonExtractionResult {
    /// Returns true if JSON was successfully extracted
    pub fn is_success(&self) -> bool {
        matches!(self, JsonExtractionResult::Success(_))
    }

    /// Converts the result to a Result, quoting the start of `content` when nothing was found.
    pub fn into_result_with_context(self, content: &str) -> Result<String, JsonExtractionError> {
        match self {
            JsonExtractionResult::Success(json) => Ok(json),
            JsonExtractionResult::Truncated {
                unclosed_braces,
                unclosed_brackets,
                ..
            } => Err(JsonExtractionError::Truncated {
                unclosed_braces,
                unclosed_brackets,
            }),
            JsonExtractionResult::NotFound => Err(JsonExtractionError::NotFound {
                content_preview: content.trim().chars().take(50).collect(),
            }),
        }
    }
}

/// Outcome of decoding model output into a typed structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// The reply contained JSON that matched `T`.
    Structured(T),
    /// No usable JSON, or JSON of the wrong shape; carries a reason for the log.
    Malformed(String),
}

impl<T> Decoded<T> {
    /// Convert into a `Result`, keeping the malformed reason as the error.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Decoded::Structured(value) => Ok(value),
            Decoded::Malformed(reason) => Err(reason),
        }
    }
}

/// Extract JSON from `content` and deserialize it into `T`.
pub fn decode_structured<T: DeserializeOwned>(content: &str) -> Decoded<T> {
    let json = match try_extract_json_from_response(content).into_result_with_context(content) {
        Ok(json) => json,
        Err(e) => return Decoded::Malformed(e.to_string()),
    };

    match serde_json::from_str::<T>(&json) {
        Ok(value) => Decoded::Structured(value),
        Err(e) => Decoded::Malformed(format!("JSON did not match expected shape: {}", e)),
    }
}

/// Brace/bracket balance of a string, ignoring characters inside string literals.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Balance {
    unclosed_braces: usize,
    unclosed_brackets: usize,
    in_string: bool,
}

fn analyze_balance(s: &str) -> Balance {
    let mut braces: isize = 0;
    let mut brackets: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => braces += 1,
            '}' if !in_string => braces -= 1,
            '[' if !in_string => brackets += 1,
            ']' if !in_string => brackets -= 1,
            _ => {}
        }
    }

    Balance {
        unclosed_braces: braces.max(0) as usize,
        unclosed_brackets: brackets.max(0) as usize,
        in_string,
    }
}

/// Attempts to extract a JSON object from an LLM response.
pub fn try_extract_json_from_response(content: &str) -> JsonExtractionResult {
    let trimmed = content.trim();

    if let Some(json) = extract_from_code_block(trimmed) {
        return JsonExtractionResult::Success(json);
    }

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            let candidate = &trimmed[..=end];
            if is_valid_json(candidate) {
                return JsonExtractionResult::Success(candidate.to_string());
            }
        }
    }

    if let Some(json) = extract_largest_valid_json_object(trimmed) {
        return JsonExtractionResult::Success(json);
    }

    if let Some(start) = trimmed.find('{') {
        let balance = analyze_balance(&trimmed[start..]);
        if balance.unclosed_braces > 0 || balance.unclosed_brackets > 0 || balance.in_string {
            return JsonExtractionResult::Truncated {
                partial_json: trimmed[start..].to_string(),
                unclosed_braces: balance.unclosed_braces,
                unclosed_brackets: balance.unclosed_brackets,
            };
        }
    }

    JsonExtractionResult::NotFound
}

/// Find the index of the '}' matching the '{' at the start of `s`.
///
/// Handles nesting, string literals and escape sequences.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn is_valid_json(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

fn code_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```([A-Za-z0-9_+-]*)[ \t]*\r?\n?([\s\S]*?)\r?\n?```").ok())
        .as_ref()
}

/// Extract a JSON object from fenced code blocks, preferring ```json blocks.
fn extract_from_code_block(content: &str) -> Option<String> {
    let mut generic = None;

    for caps in code_block_regex()?.captures_iter(content) {
        let lang = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        let Some(start) = body.find('{') else {
            continue;
        };
        let Some(end) = find_matching_brace(&body[start..]) else {
            continue;
        };
        let candidate = &body[start..=start + end];
        if !is_valid_json(candidate) {
            continue;
        }
        if lang.eq_ignore_ascii_case("json") {
            return Some(candidate.to_string());
        }
        if generic.is_none() {
            generic = Some(candidate.to_string());
        }
    }

    generic
}

/// Return the largest valid JSON object in `content`, preferring later
/// occurrences on ties (reasoning text tends to precede the answer).
fn extract_largest_valid_json_object(content: &str) -> Option<String> {
    content
        .char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| {
            let substr = &content[start..];
            let end = find_matching_brace(substr)?;
            let candidate = &substr[..=end];
            is_valid_json(candidate).then(|| (start, candidate))
        })
        .max_by(|(pos_a, a), (pos_b, b)| a.len().cmp(&b.len()).then(pos_a.cmp(pos_b)))
        .map(|(_, json)| json.to_string())
}

/// Strip a single surrounding markdown code fence from generated file content.
///
/// Content without a leading fence is returned trimmed but otherwise unchanged.
pub fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let without_open = match trimmed.find('\n') {
        Some(newline) => &trimmed[newline + 1..],
        None => return String::new(),
    };
    let body = without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open);

    body.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        score: f64,
        #[serde(default)]
        summary: String,
    }

    #[test]
    fn test_direct_json() {
        let input = r#"{"key": "value"}"#;
        assert_eq!(
            try_extract_json_from_response(input),
            JsonExtractionResult::Success(input.to_string())
        );
    }

    #[test]
    fn test_json_code_block_preferred_over_generic() {
        let input = "```text\n{\"a\": 1}\n```\nthen\n```json\n{\"b\": 2}\n```";
        assert_eq!(
            try_extract_json_from_response(input),
            JsonExtractionResult::Success("{\"b\": 2}".to_string())
        );
    }

    #[test]
    fn test_json_with_prose_prefers_largest_object() {
        let input = r#"Thinking about {"x": 1} first. Answer: {"score": 88, "summary": "ok"}"#;
        let result = try_extract_json_from_response(input);
        assert_eq!(
            result,
            JsonExtractionResult::Success(r#"{"score": 88, "summary": "ok"}"#.to_string())
        );
    }

    #[test]
    fn test_braces_inside_strings() {
        let s = r#"{"code": "fn main() { println!(\"}\"); }"}"#;
        assert_eq!(find_matching_brace(s), Some(s.len() - 1));
    }

    #[test]
    fn test_truncated_json() {
        let input = r#"{"score": 70, "summary": "cut of"#;
        match try_extract_json_from_response(input) {
            JsonExtractionResult::Truncated {
                unclosed_braces, ..
            } => assert_eq!(unclosed_braces, 1),
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found() {
        assert_eq!(
            try_extract_json_from_response("no json here"),
            JsonExtractionResult::NotFound
        );
        let err = JsonExtractionResult::NotFound
            .into_result_with_context("no json here")
            .unwrap_err();
        assert!(err.to_string().contains("no json here"));
    }

    #[test]
    fn test_decode_structured_success() {
        let decoded = decode_structured::<Sample>("```json\n{\"score\": 95, \"summary\": \"fine\"}\n```");
        assert_eq!(
            decoded,
            Decoded::Structured(Sample {
                score: 95.0,
                summary: "fine".to_string()
            })
        );
    }

    #[test]
    fn test_decode_structured_wrong_shape() {
        let decoded = decode_structured::<Sample>(r#"{"summary": "no score"}"#);
        match decoded {
            Decoded::Malformed(reason) => assert!(reason.contains("expected shape")),
            Decoded::Structured(_) => panic!("score is required"),
        }
    }

    #[test]
    fn test_decode_structured_no_json() {
        assert!(decode_structured::<Sample>("I refuse").into_result().is_err());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```rust\nfn main() {}\n```"), "fn main() {}");
        assert_eq!(strip_code_fences("  plain text \n"), "plain text");
        assert_eq!(strip_code_fences("```ts\nconst a = 1;\n"), "const a = 1;");
    }
}
