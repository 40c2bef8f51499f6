//! OpenAI-compatible chat-completions provider.
//!
//! One implementation covers OpenAI itself, a local LM Studio server and
//! OpenRouter; they differ only in base URL, authentication and default model.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{error_from_response, execute_with_retry, RetryPolicy, REQUEST_TIMEOUT_SECS};
use crate::error::LlmError;
use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message};

/// Default OpenAI API endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default LM Studio server address; the API lives under `/v1`.
pub const LMSTUDIO_DEFAULT_URL: &str = "http://localhost:1234";

/// Default OpenRouter API endpoint.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
const LMSTUDIO_DEFAULT_MODEL: &str = "local-model";
const OPENROUTER_DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Provider for any server exposing `POST {base}/chat/completions`.
pub struct OpenAiCompatibleProvider {
    name: String,
    client: Client,
    api_key: Option<String>,
    base_url: String,
    default_model: String,
    retry: RetryPolicy,
}

impl OpenAiCompatibleProvider {
    /// Create a provider with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            retry: RetryPolicy::default(),
        })
    }

    /// OpenAI with the default endpoint and `gpt-4o`.
    pub fn openai(api_key: String) -> Result<Self, LlmError> {
        Self::new("openai", Some(api_key), OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL)
    }

    /// A local LM Studio server; no key required.
    pub fn lmstudio(server_url: &str) -> Result<Self, LlmError> {
        let base_url = format!("{}/v1", server_url.trim_end_matches('/'));
        Self::new("lmstudio", None, base_url, LMSTUDIO_DEFAULT_MODEL)
    }

    /// OpenRouter with its default endpoint.
    pub fn openrouter(api_key: String) -> Result<Self, LlmError> {
        Self::new(
            "openrouter",
            Some(api_key),
            OPENROUTER_BASE_URL,
            OPENROUTER_DEFAULT_MODEL,
        )
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Provider name used in logs and the registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the default model.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Get the API key (for debugging, returns masked value).
    pub fn api_key_masked(&self) -> String {
        match &self.api_key {
            None => String::new(),
            Some(key) if key.chars().count() <= 8 => "*".repeat(key.chars().count()),
            Some(key) => {
                let chars: Vec<char> = key.chars().collect();
                let head: String = chars[..4].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            }
        }
    }

    /// Execute a single request (no retry logic).
    async fn execute_request(
        &self,
        url: &str,
        request: &ApiRequest,
    ) -> Result<GenerationResponse, LlmError> {
        let mut http_request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }
        if self.name == "openrouter" {
            http_request = http_request
                .header("HTTP-Referer", "https://polyplex.local")
                .header("X-Title", "polyplex");
        }

        let http_response = http_request
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !http_response.status().is_success() {
            return Err(error_from_response(http_response).await);
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| {
                Choice::new(
                    choice.message.content.unwrap_or_default(),
                    choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
                )
            })
            .collect();

        Ok(GenerationResponse { choices })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let url = format!("{}/chat/completions", self.base_url);

        execute_with_retry(&self.retry, &self.name, || {
            self.execute_request(&url, &api_request)
        })
        .await
    }
}

/// Internal request structure for the chat-completions API.
#[derive(Debug, Clone, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_defaults() {
        let provider = OpenAiCompatibleProvider::openai("sk-1234567890abcdef".to_string())
            .expect("client builds");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url(), OPENAI_BASE_URL);
        assert_eq!(provider.default_model(), "gpt-4o");
        assert_eq!(provider.api_key_masked(), "sk-1...cdef");
    }

    #[test]
    fn test_lmstudio_has_no_key() {
        let provider =
            OpenAiCompatibleProvider::lmstudio("http://127.0.0.1:1234/").expect("client builds");
        assert_eq!(provider.base_url(), "http://127.0.0.1:1234/v1");
        assert_eq!(provider.default_model(), "local-model");
        assert_eq!(provider.api_key_masked(), "");
    }

    #[test]
    fn test_api_key_masked_short() {
        let provider = OpenAiCompatibleProvider::openrouter("abc".to_string()).expect("client builds");
        assert_eq!(provider.api_key_masked(), "***");
    }

    #[test]
    fn test_api_response_tolerates_null_content() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).expect("parse");
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.choices[0].finish_reason.is_none());
    }
}
