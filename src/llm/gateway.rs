//! Role-based completion gateway.
//!
//! The pipeline never talks to a provider directly: every call goes through
//! [`CompletionGateway::complete`] with a [`CompletionRole`] tag, the system
//! instructions and temperature for that role, and the user content.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::registry::{ProviderAvailability, ProviderRegistry};
use super::{GenerationRequest, Message};
use crate::error::LlmError;
use crate::metrics::MetricsCollector;

/// The pipeline step a completion call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionRole {
    Design,
    Implement,
    Critique,
    Refine,
    Integrate,
}

impl CompletionRole {
    /// All roles in pipeline order.
    pub fn all() -> [CompletionRole; 5] {
        [
            CompletionRole::Design,
            CompletionRole::Implement,
            CompletionRole::Critique,
            CompletionRole::Refine,
            CompletionRole::Integrate,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionRole::Design => "design",
            CompletionRole::Implement => "implement",
            CompletionRole::Critique => "critique",
            CompletionRole::Refine => "refine",
            CompletionRole::Integrate => "integrate",
        }
    }
}

impl fmt::Display for CompletionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single role-tagged completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub role: CompletionRole,
    /// Provider name; empty selects the gateway default.
    pub provider: String,
    /// Model name; empty selects the provider default.
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

/// Uniform text-completion boundary used by every pipeline stage.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Run one completion and return its text.
    ///
    /// # Errors
    ///
    /// Returns an `LlmError` on transport failure, non-2xx responses, an
    /// unknown provider, or an empty completion.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Provider availability for operators. Gateways without a registry
    /// report nothing available.
    fn availability(&self) -> Option<ProviderAvailability> {
        None
    }
}

/// Gateway dispatching to providers held in a [`ProviderRegistry`].
pub struct LlmGateway {
    registry: Arc<ProviderRegistry>,
    metrics: MetricsCollector,
}

impl LlmGateway {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }
}

#[async_trait]
impl CompletionGateway for LlmGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let provider = self.registry.get(&request.provider)?;
        let role = request.role;

        let mut generation = GenerationRequest::new(
            request.model,
            vec![Message::system(request.system), Message::user(request.user)],
        )
        .with_temperature(request.temperature);
        if let Some(max_tokens) = request.max_tokens {
            generation = generation.with_max_tokens(max_tokens);
        }

        let started = Instant::now();
        let result = provider.generate(generation).await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = result.and_then(|response| {
            response
                .first_content()
                .map(str::trim)
                .filter(|content| !content.is_empty())
                .map(str::to_string)
                .ok_or(LlmError::EmptyResponse)
        });

        self.metrics
            .record_completion(role.as_str(), outcome.is_ok(), elapsed);
        if let Err(ref err) = outcome {
            tracing::debug!(role = %role, error = %err, "Completion failed");
        }

        outcome
    }

    fn availability(&self) -> Option<ProviderAvailability> {
        Some(self.registry.availability())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Choice, GenerationResponse, LlmProvider};
    use std::sync::Mutex;

    struct MockLlmProvider {
        response: Mutex<String>,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl MockLlmProvider {
        fn new(response: &str) -> Self {
            Self {
                response: Mutex::new(response.to_string()),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            *self.last_request.lock().expect("lock not poisoned") = Some(request);
            let content = self.response.lock().expect("lock not poisoned").clone();
            Ok(GenerationResponse {
                choices: vec![Choice::new(content, "stop")],
            })
        }
    }

    fn request(provider: &str) -> CompletionRequest {
        CompletionRequest {
            role: CompletionRole::Critique,
            provider: provider.to_string(),
            model: String::new(),
            system: "judge".to_string(),
            user: "code".to_string(),
            temperature: 0.2,
            max_tokens: Some(100),
        }
    }

    #[tokio::test]
    async fn test_complete_routes_to_named_provider() {
        let mock = Arc::new(MockLlmProvider::new("  {\"score\": 90}  "));
        let mut registry = ProviderRegistry::new("mock");
        registry.register("mock", mock.clone());
        let gateway = LlmGateway::new(Arc::new(registry));

        let text = gateway.complete(request("mock")).await.expect("completes");
        assert_eq!(text, "{\"score\": 90}");

        let sent = mock
            .last_request
            .lock()
            .expect("lock not poisoned")
            .clone()
            .expect("request recorded");
        assert_eq!(sent.messages[0], Message::system("judge"));
        assert_eq!(sent.messages[1], Message::user("code"));
        assert_eq!(sent.temperature, Some(0.2));
        assert_eq!(sent.max_tokens, Some(100));
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let mut registry = ProviderRegistry::new("mock");
        registry.register("mock", Arc::new(MockLlmProvider::new("   ")));
        let gateway = LlmGateway::new(Arc::new(registry));

        let result = gateway.complete(request("")).await;
        assert!(matches!(result, Err(LlmError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let gateway = LlmGateway::new(Arc::new(ProviderRegistry::new("mock")));
        let result = gateway.complete(request("nope")).await;
        assert!(matches!(result, Err(LlmError::UnknownProvider(_))));
    }

    #[test]
    fn test_role_names() {
        let names: Vec<_> = CompletionRole::all().iter().map(|r| r.to_string()).collect();
        assert_eq!(names, vec!["design", "implement", "critique", "refine", "integrate"]);
    }
}
