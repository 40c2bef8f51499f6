//! Completion provider implementations.
//!
//! - [`OpenAiCompatibleProvider`] speaks the `/chat/completions` dialect used by
//!   OpenAI, LM Studio and OpenRouter.
//! - [`GeminiProvider`] speaks Google's `generateContent` API.
//!
//! Both share the transient-error retry loop defined here.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;

pub use super::completion::LlmProvider;

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LlmError;

/// Default number of attempts per request (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Request timeout in seconds.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Bounded exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. 1 disables retrying.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay to wait before the given retry (1 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts.
pub(crate) async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    provider: &str,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            tracing::debug!(
                provider = provider,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying request after transient failure"
            );
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient_error(&err) => {
                tracing::warn!(
                    provider = provider,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %err,
                    "Transient provider error"
                );
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        LlmError::RequestFailed("Max retries exceeded with no error captured".to_string())
    }))
}

/// Check if an error is transient and should be retried.
pub(crate) fn is_transient_error(error: &LlmError) -> bool {
    match error {
        LlmError::RequestFailed(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("timeout")
                || msg.contains("timed out")
                || msg.contains("connection")
                || msg.contains("temporarily")
        }
        LlmError::RateLimited(_) => true,
        LlmError::ApiError { code, .. } => *code >= 500 || *code == 429,
        _ => false,
    }
}

/// Error envelope shared by OpenAI-style and Gemini APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Convert a non-success HTTP response into an [`LlmError`].
pub(crate) async fn error_from_response(response: reqwest::Response) -> LlmError {
    let status_code = response.status().as_u16();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
        .map(|parsed| parsed.error.message)
        .unwrap_or(error_text);

    if status_code == 429 {
        LlmError::RateLimited(message)
    } else {
        LlmError::ApiError {
            code: status_code,
            message,
        }
    }
}
