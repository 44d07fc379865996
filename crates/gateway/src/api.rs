//! Workflow API routes.
//!
//! - `GET  /health`               — liveness probe
//! - `GET  /status`               — uptime, backend, active runs
//! - `GET  /tools`                — registered tools
//! - `GET  /runs`                 — ids of live streamed runs
//! - `POST /run-workflow`         — run to completion, return the final memory
//! - `GET  /stream-workflow`      — SSE stream of the default workflow's events
//! - `POST /stream-workflow`      — SSE stream of the posted workflow's events
//! - `POST /cancel/{run_id}`      — cancel a live run
//!
//! `run-workflow` and `stream-workflow` accept an optional JSON workflow body;
//! an empty body runs the default workflow. Either may name a backend for
//! that request only: `?backend=echo`, or `?use_openai=true` for `openai`.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

use stepweave_core::event::RunEvent;
use stepweave_core::tool::ToolInfo;
use stepweave_workflow::{CancelOutcome, RunBridge, RunOutput, WorkflowDefinition};

use crate::SharedState;

/// Build the API router.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/tools", get(list_tools_handler))
        .route("/runs", get(list_runs_handler))
        .route("/run-workflow", post(run_workflow_handler))
        .route(
            "/stream-workflow",
            get(stream_workflow_handler).post(stream_workflow_handler),
        )
        .route("/cancel/{run_id}", post(cancel_handler))
        .with_state(state)
}

// ── Shared types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// The posted workflow, or the default one for an empty body.
fn workflow_from_body(state: &SharedState, body: &Bytes) -> Result<WorkflowDefinition, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(state.default_workflow.clone());
    }
    let text = std::str::from_utf8(body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("body is not UTF-8: {e}")))?;
    WorkflowDefinition::from_json_str(text)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Per-request backend selection.
#[derive(Debug, Default, Deserialize)]
pub struct BackendQuery {
    pub backend: Option<String>,
    #[serde(default)]
    pub use_openai: bool,
}

impl BackendQuery {
    fn backend_name(&self) -> Option<&str> {
        match (&self.backend, self.use_openai) {
            (Some(name), _) => Some(name.as_str()),
            (None, true) => Some("openai"),
            (None, false) => None,
        }
    }
}

/// The gateway's bridge, or one over the backend the query names.
fn bridge_for(state: &SharedState, query: &BackendQuery) -> Result<Arc<RunBridge>, ApiError> {
    match query.backend_name() {
        None => Ok(state.bridge.clone()),
        Some(name) => state.bridge_for_backend(name).map_err(|e| {
            warn!(backend = name, error = %e, "Rejected per-request backend");
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        }),
    }
}

// ── Health & status ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    backend: String,
    tools_count: usize,
    active_runs: usize,
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds()
        .max(0) as u64;
    let runner = state.bridge.runner();

    Json(StatusResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime,
        backend: runner.backend_name().to_string(),
        tools_count: runner.tools().len(),
        active_runs: state.bridge.registry().len(),
    })
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.bridge.runner().tools().describe(),
    })
}

#[derive(Serialize)]
struct RunListResponse {
    runs: Vec<String>,
}

async fn list_runs_handler(State(state): State<SharedState>) -> Json<RunListResponse> {
    Json(RunListResponse {
        runs: state.bridge.registry().active_runs(),
    })
}

// ── Runs ──────────────────────────────────────────────────────────────────

/// `POST /run-workflow` — run a workflow to completion.
async fn run_workflow_handler(
    State(state): State<SharedState>,
    Query(query): Query<BackendQuery>,
    body: Bytes,
) -> Result<Json<RunOutput>, ApiError> {
    let bridge = bridge_for(&state, &query)?;
    let workflow = workflow_from_body(&state, &body)?;
    info!(
        steps = workflow.steps.len(),
        backend = bridge.runner().backend_name(),
        "run-workflow request"
    );

    bridge.run(&workflow).await.map(Json).map_err(|e| {
        warn!(error = %e, "run-workflow failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// Cancels the run if the stream is dropped before its terminal event.
struct CancelOnDisconnect {
    bridge: Arc<RunBridge>,
    run_id: String,
    finished: bool,
}

impl Drop for CancelOnDisconnect {
    fn drop(&mut self) {
        if !self.finished && self.bridge.cancel(&self.run_id) == CancelOutcome::Requested {
            info!(run_id = %self.run_id, "Stream client disconnected; run cancelled");
        }
    }
}

fn to_sse(event: &RunEvent) -> SseEvent {
    let data = serde_json::to_string(event).unwrap_or_default();
    SseEvent::default().event(event.event_type()).data(data)
}

/// `GET|POST /stream-workflow` — start a run and stream its events as SSE.
///
/// The first event is `started` with the run id; the stream ends after
/// `done`, `error`, or `cancelled`.
async fn stream_workflow_handler(
    State(state): State<SharedState>,
    Query(query): Query<BackendQuery>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let bridge = bridge_for(&state, &query)?;
    let workflow = workflow_from_body(&state, &body)?;
    let run = bridge.start(workflow);
    info!(run_id = %run.run_id, backend = bridge.runner().backend_name(), "stream-workflow request");

    let mut guard = CancelOnDisconnect {
        bridge,
        run_id: run.run_id.clone(),
        finished: false,
    };
    let stream = run.into_stream().map(move |event| {
        if event.is_terminal() {
            guard.finished = true;
        }
        Ok(to_sse(&event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.poll_interval)))
}

#[derive(Serialize)]
struct CancelResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
}

/// `POST /cancel/{run_id}` — request cancellation of a live run.
async fn cancel_handler(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Json<CancelResponse> {
    match state.bridge.cancel(&run_id) {
        CancelOutcome::Requested => Json(CancelResponse {
            status: "cancelled",
            run_id: Some(run_id),
        }),
        CancelOutcome::NotFound => Json(CancelResponse {
            status: "not_found",
            run_id: None,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
