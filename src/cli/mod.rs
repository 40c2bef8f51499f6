//! Command-line interface for polyplex.
//!
//! Provides commands for serving the operator API, submitting and reviewing
//! tasks, and driving the autopilot.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
