//! Per-task generation pipeline.
//!
//! # Stages
//!
//! 1. **Design**: one `design` completion returning a structured architecture.
//!    An absent, malformed or file-less design fails the task.
//! 2. **Implement**: one `implement` completion per planned file, in priority
//!    order. A failed call leaves a sentinel artifact and the run continues.
//! 3. **Critique/Refine**: the bounded loop in [`refine`], driven by the
//!    [`QualityGate`](crate::quality::QualityGate) predicate.
//! 4. **Integrate**: one `integrate` completion over truncated snippets of
//!    every artifact. Failure only drops the integration adjustment.
//! 5. **Finalize**: final score, gate verdict, status transition and the
//!    optional auto-approval.
//!
//! # Example
//!
//! ```rust,ignore
//! use polyplex::pipeline::{PipelineConfig, PipelineEngine};
//! use polyplex::storage::StoreHandle;
//!
//! let config = PipelineConfig::from_env()?.with_max_files(6);
//! let engine = PipelineEngine::new(StoreHandle::json_file("./polyplex-db.json"), gateway, config);
//! let status = engine.run_task("task-1718000000000-1a2b3c4d").await?;
//! ```

pub mod config;
pub mod engine;
pub mod prompts;
pub mod refine;

pub use config::{ConfigError, PipelineConfig, RoleProfile, RoleProfiles};
pub use engine::{PipelineEngine, PipelineError};
