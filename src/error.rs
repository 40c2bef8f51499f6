//! Error types for polyplex operations.
//!
//! Defines error types for the major subsystems:
//! - Completion provider interactions
//! - Document store persistence
//! - Task lifecycle transitions
//! - Autopilot scheduling

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key for provider '{0}'")]
    MissingApiKey(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Provider returned an empty completion")]
    EmptyResponse,
}

/// Errors that can occur while reading or writing the task document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Document at '{path}' is not valid JSON: {message}")]
    Corrupt { path: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task '{0}' not found")]
    NotFound(String),

    #[error("Stream entry '{0}' not found")]
    StreamEntryNotFound(String),

    #[error("Invalid state transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Task '{0}' is already approved")]
    AlreadyApproved(String),

    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that can occur in the autopilot scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}
