//! LLM integration for polyplex.
//!
//! Layers, bottom-up:
//!
//! - [`completion`]: chat request/response types and the [`LlmProvider`] trait
//! - [`providers`]: HTTP providers (OpenAI-compatible, Gemini) with transient retry
//! - [`registry`]: providers addressable by name, built from the environment
//! - [`gateway`]: the role-tagged [`CompletionGateway`] the pipeline consumes
//!
//! ```ignore
//! use polyplex::llm::{CompletionGateway, CompletionRequest, CompletionRole, LlmGateway};
//! use polyplex::llm::registry::{ProviderRegistry, ProvidersConfig};
//! use std::sync::Arc;
//!
//! let registry = ProviderRegistry::from_config(&ProvidersConfig::from_env())?;
//! let gateway = LlmGateway::new(Arc::new(registry));
//!
//! let text = gateway
//!     .complete(CompletionRequest {
//!         role: CompletionRole::Critique,
//!         provider: "openai".to_string(),
//!         model: String::new(),
//!         system: "You review code.".to_string(),
//!         user: "fn main() {}".to_string(),
//!         temperature: 0.2,
//!         max_tokens: None,
//!     })
//!     .await?;
//! ```

pub mod completion;
pub mod gateway;
pub mod providers;
pub mod registry;

pub use completion::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message};
pub use gateway::{CompletionGateway, CompletionRequest, CompletionRole, LlmGateway};
pub use providers::{GeminiProvider, OpenAiCompatibleProvider, RetryPolicy};
pub use registry::{ProviderAvailability, ProviderRegistry, ProvidersConfig};
