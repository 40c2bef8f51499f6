//! Autopilot: unattended task creation.
//!
//! A single periodic timer ticks the [`AutopilotScheduler`]. Each tick
//! either does nothing (disabled), disables itself (goal reached), waits
//! (concurrency cap reached) or creates one task and starts its pipeline
//! without awaiting it.
//!
//! # Example
//!
//! ```rust,ignore
//! use polyplex::scheduler::{AutopilotConfig, AutopilotScheduler};
//! use std::sync::Arc;
//!
//! let scheduler = Arc::new(AutopilotScheduler::new(store, lifecycle, 3));
//! let first = scheduler.start(AutopilotConfig::new("todo app")).await?;
//! // ...
//! scheduler.stop().await?;
//! ```

pub mod autopilot;
pub mod state;

pub use autopilot::{AutopilotScheduler, TickOutcome};
pub use state::{
    phase_for_cycle, AutopilotConfig, OrchestratorState, DEFAULT_SEED, MIN_TICK_MS, PHASES,
};
