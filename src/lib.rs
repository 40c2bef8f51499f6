//! polyplex: task orchestration and quality-gate engine.
//!
//! A prompt becomes a task; the pipeline designs an architecture, implements
//! each planned artifact, critiques and refines them until the quality gate
//! is satisfied or the depth budget runs out, checks integration and leaves
//! the task for operator review. The autopilot keeps a bounded number of
//! such tasks running until an approved-output goal is met.

// Core modules
pub mod api;
pub mod app;
pub mod cli;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod utils;

pub use app::Polyplex;

// Re-export commonly used error types
pub use error::{LlmError, SchedulerError, StoreError, TaskError};
