//! Named provider registry built from the environment.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::providers::openai::LMSTUDIO_DEFAULT_URL;
use super::providers::{GeminiProvider, OpenAiCompatibleProvider, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use super::LlmProvider;
use crate::error::LlmError;

/// Provider used when neither the request nor `DEFAULT_PROVIDER` names one.
pub const FALLBACK_PROVIDER: &str = "openai";

/// Credentials and endpoints for every supported provider.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub lmstudio_url: String,
    pub openrouter_api_key: Option<String>,
    pub default_provider: String,
    pub retry: RetryPolicy,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: None,
            gemini_api_key: None,
            lmstudio_url: LMSTUDIO_DEFAULT_URL.to_string(),
            openrouter_api_key: None,
            default_provider: FALLBACK_PROVIDER.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProvidersConfig {
    /// Read provider configuration from environment variables.
    ///
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`
    /// - `GEMINI_API_KEY`
    /// - `LMSTUDIO_URL` (default: http://localhost:1234)
    /// - `OPENROUTER_API_KEY`
    /// - `DEFAULT_PROVIDER` (default: openai)
    /// - `PROVIDER_MAX_RETRIES`: total attempts per request (default: 3)
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.openai_api_key = non_empty("OPENAI_API_KEY");
        config.openai_base_url = non_empty("OPENAI_BASE_URL");
        config.gemini_api_key = non_empty("GEMINI_API_KEY");
        config.openrouter_api_key = non_empty("OPENROUTER_API_KEY");
        if let Some(url) = non_empty("LMSTUDIO_URL") {
            config.lmstudio_url = url;
        }
        if let Some(provider) = non_empty("DEFAULT_PROVIDER") {
            config.default_provider = provider;
        }
        if let Some(raw) = non_empty("PROVIDER_MAX_RETRIES") {
            match raw.parse::<u32>() {
                Ok(attempts) => config.retry.max_attempts = attempts.max(1),
                Err(_) => tracing::warn!(
                    value = %raw,
                    default = DEFAULT_MAX_ATTEMPTS,
                    "Ignoring unparseable PROVIDER_MAX_RETRIES"
                ),
            }
        }

        config
    }
}

/// Availability report served to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAvailability {
    pub openai: bool,
    pub gemini: bool,
    pub lmstudio: bool,
    pub openrouter: bool,
    pub default_provider: String,
    pub lmstudio_url: String,
}

/// Providers addressable by name.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
    default_provider: String,
    lmstudio_url: String,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider: default_provider.into(),
            lmstudio_url: LMSTUDIO_DEFAULT_URL.to_string(),
        }
    }

    /// Build every provider the configuration has credentials for.
    ///
    /// LM Studio is always registered since it is a local, keyless server.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, LlmError> {
        let mut registry = Self::new(config.default_provider.clone());
        registry.lmstudio_url = config.lmstudio_url.clone();

        if let Some(key) = &config.openai_api_key {
            let provider = match &config.openai_base_url {
                Some(url) => OpenAiCompatibleProvider::new("openai", Some(key.clone()), url.as_str(), "gpt-4o")?,
                None => OpenAiCompatibleProvider::openai(key.clone())?,
            };
            registry.register("openai", Arc::new(provider.with_retry_policy(config.retry)));
        }

        let lmstudio = OpenAiCompatibleProvider::lmstudio(&config.lmstudio_url)?;
        registry.register("lmstudio", Arc::new(lmstudio.with_retry_policy(config.retry)));

        if let Some(key) = &config.openrouter_api_key {
            let provider = OpenAiCompatibleProvider::openrouter(key.clone())?;
            registry.register("openrouter", Arc::new(provider.with_retry_policy(config.retry)));
        }

        if let Some(key) = &config.gemini_api_key {
            let provider = GeminiProvider::new(key.clone())?;
            registry.register("gemini", Arc::new(provider.with_retry_policy(config.retry)));
        }

        tracing::info!(
            providers = ?registry.names(),
            default = %registry.default_provider,
            "Provider registry initialized"
        );

        Ok(registry)
    }

    /// Add or replace a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Look up a provider; an empty name resolves to the default provider.
    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let key = if name.is_empty() {
            self.default_provider.as_str()
        } else {
            name
        };
        match self.providers.get(key) {
            Some(provider) => Ok(Arc::clone(provider)),
            None if matches!(key, "openai" | "gemini" | "openrouter") => {
                Err(LlmError::MissingApiKey(key.to_string()))
            }
            None => Err(LlmError::UnknownProvider(key.to_string())),
        }
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Name of the default provider.
    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Which providers can currently serve requests.
    pub fn availability(&self) -> ProviderAvailability {
        ProviderAvailability {
            openai: self.providers.contains_key("openai"),
            gemini: self.providers.contains_key("gemini"),
            lmstudio: self.providers.contains_key("lmstudio"),
            openrouter: self.providers.contains_key("openrouter"),
            default_provider: self.default_provider.clone(),
            lmstudio_url: self.lmstudio_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_keys_registers_lmstudio_only() {
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default()).expect("builds");
        assert_eq!(registry.names(), vec!["lmstudio".to_string()]);

        let availability = registry.availability();
        assert!(availability.lmstudio);
        assert!(!availability.openai);
        assert_eq!(availability.default_provider, "openai");
        assert_eq!(availability.lmstudio_url, "http://localhost:1234");
    }

    #[test]
    fn test_missing_key_vs_unknown_provider() {
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default()).expect("builds");

        assert!(matches!(registry.get("openai"), Err(LlmError::MissingApiKey(_))));
        assert!(matches!(registry.get(""), Err(LlmError::MissingApiKey(_))));
        assert!(matches!(registry.get("claude"), Err(LlmError::UnknownProvider(_))));
        assert!(registry.get("lmstudio").is_ok());
    }

    #[test]
    fn test_from_config_with_keys() {
        let config = ProvidersConfig {
            openai_api_key: Some("sk-test".to_string()),
            gemini_api_key: Some("g-test".to_string()),
            default_provider: "gemini".to_string(),
            ..ProvidersConfig::default()
        };
        let registry = ProviderRegistry::from_config(&config).expect("builds");
        assert_eq!(registry.names(), vec!["gemini", "lmstudio", "openai"]);
        assert!(registry.get("").is_ok());
        assert_eq!(registry.default_provider(), "gemini");
    }
}
