//! Operator HTTP API.
//!
//! JSON endpoints for submitting prompts, reviewing tasks, driving the
//! autopilot and editing settings, plus `/health` and `/metrics`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app::{Polyplex, StateView};
use crate::error::{SchedulerError, StoreError, TaskError};
use crate::llm::ProviderAvailability;
use crate::metrics::metrics_handler;
use crate::scheduler::{AutopilotConfig, OrchestratorState, TickOutcome};
use crate::task::{ApprovalReason, NewTask, Settings, SettingsPatch, StreamEntry, Task};

/// Default port for the operator API.
pub const DEFAULT_PORT: u16 = 3001;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether to enable CORS.
    pub enable_cors: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            enable_cors: true,
        }
    }
}

/// Body of `POST /api/prompt`.
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub task_id: String,
}

/// Body of `POST /api/tasks/{id}/reject`.
#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectResponse {
    pub child_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub orchestrator: OrchestratorState,
    pub tick: TickOutcome,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    tracing::error!(error = %e, "Store failure while serving request");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e)
}

fn task_error(e: TaskError) -> ApiError {
    match e {
        TaskError::NotFound(_) | TaskError::StreamEntryNotFound(_) => {
            api_error(StatusCode::NOT_FOUND, "NOT_FOUND", e)
        }
        TaskError::InvalidTransition { .. } => {
            api_error(StatusCode::CONFLICT, "INVALID_TRANSITION", e)
        }
        TaskError::AlreadyApproved(_) => api_error(StatusCode::CONFLICT, "ALREADY_APPROVED", e),
        TaskError::EmptyPrompt => api_error(StatusCode::BAD_REQUEST, "EMPTY_PROMPT", e),
        TaskError::Store(e) => store_error(e),
    }
}

fn scheduler_error(e: SchedulerError) -> ApiError {
    match e {
        SchedulerError::Store(e) => store_error(e),
        SchedulerError::Task(e) => task_error(e),
    }
}

/// Operator HTTP server.
pub struct HttpServer {
    config: HttpServerConfig,
    app: Arc<Polyplex>,
}

impl HttpServer {
    pub fn new(app: Arc<Polyplex>, config: HttpServerConfig) -> Self {
        Self { config, app }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let app = Router::new()
            .route("/api/prompt", post(submit_prompt))
            .route("/api/state", get(get_state))
            .route("/api/settings", get(get_settings).put(update_settings))
            // Autopilot
            .route("/api/orchestrator", get(get_orchestrator))
            .route("/api/orchestrator/start", post(start_orchestrator))
            .route("/api/orchestrator/stop", post(stop_orchestrator))
            .route("/api/providers", get(get_providers))
            // Task lifecycle
            .route("/api/tasks/{id}", get(get_task).delete(delete_task))
            .route("/api/tasks/{id}/approve", post(approve_task))
            .route("/api/tasks/{id}/reject", post(reject_task))
            .route("/api/stream/{id}", delete(delete_stream_entry))
            .route("/api/reset", post(reset))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_handler))
            .with_state(Arc::clone(&self.app));

        if self.config.enable_cors {
            app.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(TraceLayer::new_for_http())
        } else {
            app.layer(TraceLayer::new_for_http())
        }
    }

    /// Start the server with a shutdown signal.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let router = self.router();

        tracing::info!("polyplex API listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

// Handler functions

async fn health_check() -> &'static str {
    "OK"
}

async fn submit_prompt(
    State(app): State<Arc<Polyplex>>,
    Json(req): Json<PromptRequest>,
) -> Result<Json<PromptResponse>, ApiError> {
    let request = NewTask::manual(req.prompt)
        .with_provider(req.provider)
        .with_model(req.model);
    let spawned = app.lifecycle().submit(request).await.map_err(task_error)?;
    Ok(Json(PromptResponse {
        task_id: spawned.task_id,
    }))
}

async fn get_state(State(app): State<Arc<Polyplex>>) -> Result<Json<StateView>, ApiError> {
    app.state().await.map(Json).map_err(store_error)
}

async fn get_settings(State(app): State<Arc<Polyplex>>) -> Result<Json<Settings>, ApiError> {
    app.settings().await.map(Json).map_err(store_error)
}

async fn update_settings(
    State(app): State<Arc<Polyplex>>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>, ApiError> {
    app.update_settings(patch).await.map(Json).map_err(store_error)
}

async fn get_orchestrator(
    State(app): State<Arc<Polyplex>>,
) -> Result<Json<OrchestratorState>, ApiError> {
    app.scheduler().state().await.map(Json).map_err(scheduler_error)
}

async fn start_orchestrator(
    State(app): State<Arc<Polyplex>>,
    Json(config): Json<AutopilotConfig>,
) -> Result<Json<StartResponse>, ApiError> {
    let tick = app.scheduler().start(config).await.map_err(scheduler_error)?;
    let orchestrator = app.scheduler().state().await.map_err(scheduler_error)?;
    Ok(Json(StartResponse { orchestrator, tick }))
}

async fn stop_orchestrator(
    State(app): State<Arc<Polyplex>>,
) -> Result<Json<OrchestratorState>, ApiError> {
    app.scheduler().stop().await.map(Json).map_err(scheduler_error)
}

async fn get_providers(State(app): State<Arc<Polyplex>>) -> Json<ProviderAvailability> {
    Json(app.providers())
}

async fn get_task(
    State(app): State<Arc<Polyplex>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    app.lifecycle().get(&id).await.map(Json).map_err(task_error)
}

async fn approve_task(
    State(app): State<Arc<Polyplex>>,
    Path(id): Path<String>,
) -> Result<Json<StreamEntry>, ApiError> {
    app.lifecycle()
        .approve(&id, ApprovalReason::Manual)
        .await
        .map(Json)
        .map_err(task_error)
}

async fn reject_task(
    State(app): State<Arc<Polyplex>>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<RejectResponse>, ApiError> {
    let spawned = app
        .lifecycle()
        .reject(&id, req.feedback)
        .await
        .map_err(task_error)?;
    Ok(Json(RejectResponse {
        child_id: spawned.task_id,
    }))
}

async fn delete_task(
    State(app): State<Arc<Polyplex>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    app.lifecycle().delete(&id).await.map_err(task_error)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn delete_stream_entry(
    State(app): State<Arc<Polyplex>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    app.lifecycle()
        .delete_stream_entry(&id)
        .await
        .map_err(task_error)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn reset(State(app): State<Arc<Polyplex>>) -> Result<Json<OkResponse>, ApiError> {
    app.lifecycle().reset().await.map_err(task_error)?;
    Ok(Json(OkResponse { ok: true }))
}
