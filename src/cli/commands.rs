//! CLI command definitions for polyplex.
//!
//! Every command works on the same JSON document store as the HTTP server,
//! so tasks created here show up in the operator API and vice versa.

use crate::api::{HttpServer, HttpServerConfig, DEFAULT_PORT};
use crate::app::Polyplex;
use crate::metrics::init_metrics;
use crate::pipeline::prompts::truncate_chars;
use crate::scheduler::{AutopilotConfig, DEFAULT_SEED};
use crate::storage::DEFAULT_STORE_PATH;
use crate::task::{ApprovalReason, NewTask, Spawned, Task, TaskStatus};
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default host for the operator API.
const DEFAULT_HOST: &str = "127.0.0.1";

/// How often a foreground autopilot checks whether its timer is still alive.
const AUTOPILOT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Task orchestration and quality-gate engine.
#[derive(Parser)]
#[command(name = "polyplex")]
#[command(about = "Turn prompts into reviewed, quality-gated code artifacts")]
#[command(version)]
#[command(
    long_about = "polyplex runs every prompt through design, implementation, a bounded critique/refine loop and an integration check, then holds the result for operator review.\n\nExample usage:\n  polyplex serve --port 3001\n  polyplex submit \"build a counter\" --provider lmstudio\n  polyplex autopilot start \"improve existing code\" --target-y 5"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Path of the JSON document store.
    #[arg(long, env = "POLYPLEX_STORE", default_value = DEFAULT_STORE_PATH, global = true)]
    pub store: String,

    /// Host of the operator API.
    #[arg(long, env = "POLYPLEX_HOST", default_value = DEFAULT_HOST, global = true)]
    pub host: String,

    /// Port of the operator API.
    #[arg(long, env = "POLYPLEX_PORT", default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the operator HTTP API and resume the autopilot if it was enabled.
    Serve,

    /// Submit a prompt and run its pipeline to completion.
    Submit(SubmitArgs),

    /// Show one task, or a summary of all tasks.
    Status(StatusArgs),

    /// Approve a task into the stream.
    Approve(TaskIdArgs),

    /// Reject a task and run the retry it spawns.
    Reject(RejectArgs),

    /// Delete a task. Its stream entry, if any, is kept.
    Delete(TaskIdArgs),

    /// Control the autopilot.
    Autopilot(AutopilotArgs),

    /// Remove every task and stream entry.
    Reset,

    /// Show which completion providers are configured.
    Providers,
}

/// Arguments for `polyplex submit`.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// The requirement to build.
    pub prompt: String,

    /// Completion provider (openai, gemini, lmstudio, openrouter).
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model name; the provider default when omitted.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Hand the prompt to a running server instead of running it here.
    #[arg(short, long)]
    pub detach: bool,
}

/// Arguments for `polyplex status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Task id; all tasks when omitted.
    pub id: Option<String>,
}

/// Arguments for commands taking a single task id.
#[derive(Parser, Debug)]
pub struct TaskIdArgs {
    /// Task id.
    pub id: String,
}

/// Arguments for `polyplex reject`.
#[derive(Parser, Debug)]
pub struct RejectArgs {
    /// Task id.
    pub id: String,

    /// What was wrong; carried into the retry and remembered for future designs.
    #[arg(short, long)]
    pub feedback: Option<String>,
}

/// Autopilot entrypoint arguments.
#[derive(Parser, Debug)]
pub struct AutopilotArgs {
    /// Autopilot subcommand to run.
    #[command(subcommand)]
    pub command: AutopilotSubcommand,
}

/// Autopilot subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum AutopilotSubcommand {
    /// Start the autopilot and drive it in the foreground until its goal is met.
    Start(AutopilotStartArgs),

    /// Disable the autopilot.
    Stop,

    /// Show the persisted autopilot state.
    Status,
}

/// Arguments for `polyplex autopilot start`.
#[derive(Parser, Debug)]
pub struct AutopilotStartArgs {
    /// Seed prompt every generated task builds on.
    #[arg(default_value = DEFAULT_SEED)]
    pub seed: String,

    /// Completion provider for generated tasks.
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model for generated tasks.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Number of additional approved outputs to reach.
    #[arg(short = 'y', long)]
    pub target_y: Option<u32>,

    /// Keep creating tasks without a goal.
    #[arg(long)]
    pub infinite: bool,

    /// Maximum number of concurrently active tasks.
    #[arg(long)]
    pub max_active: Option<usize>,

    /// Tick period in milliseconds.
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Final score at which generated tasks are approved automatically.
    #[arg(long)]
    pub threshold: Option<f64>,
}

impl From<AutopilotStartArgs> for AutopilotConfig {
    fn from(args: AutopilotStartArgs) -> Self {
        AutopilotConfig {
            seed_prompt: args.seed,
            provider: args.provider,
            model: args.model,
            target_y: args.target_y,
            infinite: args.infinite,
            max_active: args.max_active,
            tick_ms: args.tick_ms,
            auto_approve_threshold: args.threshold,
        }
    }
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let server = HttpServerConfig {
        host: cli.host.clone(),
        port: cli.port,
        ..HttpServerConfig::default()
    };

    if let Commands::Submit(args) = &cli.command {
        if args.detach {
            return run_detached_submit(args, &server).await;
        }
    }

    let app = Arc::new(Polyplex::from_env(&cli.store)?);
    match cli.command {
        Commands::Serve => run_serve_command(app, server).await,
        Commands::Submit(args) => run_submit_command(&app, args).await,
        Commands::Status(args) => run_status_command(&app, args).await,
        Commands::Approve(args) => {
            let entry = app
                .lifecycle()
                .approve(&args.id, ApprovalReason::Manual)
                .await
                .with_context(|| format!("Failed to approve {}", args.id))?;
            print_json(&entry)
        }
        Commands::Reject(args) => run_reject_command(&app, args).await,
        Commands::Delete(args) => {
            app.lifecycle()
                .delete(&args.id)
                .await
                .with_context(|| format!("Failed to delete {}", args.id))?;
            println!("Deleted {}", args.id);
            Ok(())
        }
        Commands::Autopilot(args) => run_autopilot_command(&app, args).await,
        Commands::Reset => {
            app.lifecycle().reset().await.context("Failed to reset store")?;
            println!("Store reset");
            Ok(())
        }
        Commands::Providers => print_json(&app.providers()),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_serve_command(app: Arc<Polyplex>, config: HttpServerConfig) -> anyhow::Result<()> {
    init_metrics().context("Failed to register metrics")?;

    if app
        .scheduler()
        .resume_if_enabled()
        .await
        .context("Failed to read autopilot state")?
    {
        info!("Autopilot resumed from persisted state");
    }

    HttpServer::new(app, config)
        .serve_with_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server failed: {}", e))
}

async fn run_submit_command(app: &Polyplex, args: SubmitArgs) -> anyhow::Result<()> {
    let request = NewTask::manual(args.prompt)
        .with_provider(args.provider)
        .with_model(args.model);
    let spawned = app
        .lifecycle()
        .submit(request)
        .await
        .context("Failed to create task")?;
    info!(task_id = %spawned.task_id, "Pipeline started");

    let task = wait_for(app, spawned).await?;
    print_json(&TaskReport::from(&task))
}

async fn run_detached_submit(args: &SubmitArgs, server: &HttpServerConfig) -> anyhow::Result<()> {
    let url = format!("http://{}:{}/api/prompt", server.host, server.port);
    let body = serde_json::json!({
        "prompt": args.prompt,
        "provider": args.provider,
        "model": args.model,
    });

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Failed to reach polyplex server at {}", url))?;

    let status = response.status();
    let payload: serde_json::Value = response
        .json()
        .await
        .context("Server returned a non-JSON response")?;
    if !status.is_success() {
        anyhow::bail!("Server rejected prompt ({}): {}", status, payload["error"]);
    }
    print_json(&payload)
}

async fn run_status_command(app: &Polyplex, args: StatusArgs) -> anyhow::Result<()> {
    if let Some(id) = args.id {
        let task = app
            .lifecycle()
            .get(&id)
            .await
            .with_context(|| format!("Failed to load {}", id))?;
        return print_json(&task);
    }

    let state = app.state().await.context("Failed to read store")?;
    let orchestrator = app
        .scheduler()
        .state()
        .await
        .context("Failed to read autopilot state")?;

    let summary = StatusSummary {
        tasks: state.tasks.iter().map(TaskReport::from).collect(),
        stream: state.stream.len(),
        wisdom: state.wisdom_log.len(),
        autopilot: orchestrator.status_message,
    };
    print_json(&summary)
}

async fn run_reject_command(app: &Polyplex, args: RejectArgs) -> anyhow::Result<()> {
    let spawned = app
        .lifecycle()
        .reject(&args.id, args.feedback)
        .await
        .with_context(|| format!("Failed to reject {}", args.id))?;
    info!(task_id = %args.id, child_id = %spawned.task_id, "Retry started");

    let child = wait_for(app, spawned).await?;
    print_json(&TaskReport::from(&child))
}

async fn run_autopilot_command(app: &Polyplex, args: AutopilotArgs) -> anyhow::Result<()> {
    let scheduler = app.scheduler();
    match args.command {
        AutopilotSubcommand::Start(args) => {
            let outcome = scheduler
                .start(args.into())
                .await
                .context("Failed to start autopilot")?;
            info!(outcome = outcome.label(), "First autopilot tick");

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(AUTOPILOT_POLL_INTERVAL) => {
                        if !scheduler.timer_active() {
                            break;
                        }
                    }
                    _ = shutdown_signal() => {
                        warn!("Interrupted; stopping autopilot");
                        scheduler.stop().await.context("Failed to stop autopilot")?;
                        break;
                    }
                }
            }

            let state = scheduler.state().await.context("Failed to read autopilot state")?;
            print_json(&state)
        }
        AutopilotSubcommand::Stop => {
            let state = scheduler.stop().await.context("Failed to stop autopilot")?;
            print_json(&state)
        }
        AutopilotSubcommand::Status => {
            let state = scheduler.state().await.context("Failed to read autopilot state")?;
            print_json(&state)
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Compact view of a task for terminal output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskReport {
    id: String,
    status: TaskStatus,
    score: Option<f64>,
    z_depth: u32,
    files: usize,
    prompt: String,
}

impl From<&Task> for TaskReport {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            status: task.status,
            score: task.score,
            z_depth: task.z_depth,
            files: task.files.len(),
            prompt: truncate_chars(&task.prompt, 80).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusSummary {
    tasks: Vec<TaskReport>,
    stream: usize,
    wisdom: usize,
    autopilot: String,
}

/// Wait for a spawned pipeline and reload the task it worked on.
async fn wait_for(app: &Polyplex, spawned: Spawned) -> anyhow::Result<Task> {
    let status = spawned
        .handle
        .await
        .context("Pipeline task panicked")?;
    if status.is_none() {
        warn!(task_id = %spawned.task_id, "Pipeline ended without a final status");
    }
    app.lifecycle()
        .get(&spawned.task_id)
        .await
        .with_context(|| format!("Failed to reload {}", spawned.task_id))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
