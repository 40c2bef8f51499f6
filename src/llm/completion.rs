//! Chat-completion request/response types and the provider trait.
//!
//! Every backend (OpenAI-compatible servers, Gemini) is driven through the
//! same [`LlmProvider`] trait so the gateway can pick one by name at runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier. Empty means "provider default".
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated content of all system messages.
    pub fn system_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    /// Generated choices, in provider order.
    pub choices: Vec<Choice>,
}

impl GenerationResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.content.as_str())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Generated text.
    pub content: String,
    /// Reason the generation stopped (e.g., "stop", "length"), lowercased.
    pub finish_reason: String,
}

impl Choice {
    pub fn new(content: impl Into<String>, finish_reason: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: finish_reason.into(),
        }
    }
}

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, "system");
        assert_eq!(Message::user("u").role, "user");
        assert_eq!(Message::user("u").content, "u");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new(
            "gpt-4o",
            vec![Message::system("one"), Message::user("q"), Message::system("two")],
        )
        .with_temperature(0.2)
        .with_max_tokens(512);

        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.system_text(), "one\n\ntwo");
    }

    #[test]
    fn test_request_skips_unset_options() {
        let request = GenerationRequest::new("m", vec![Message::user("hi")]);
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_first_content() {
        let response = GenerationResponse {
            choices: vec![Choice::new("hello", "stop"), Choice::new("second", "length")],
        };
        assert_eq!(response.first_content(), Some("hello"));
        assert_eq!(GenerationResponse::default().first_content(), None);
    }
}
