//! Synthesis job control.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use silica_core::synth::SynthParams;

use crate::error::AppError;
use crate::types::{StartJobRequest, WaitJobRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions/:id/jobs", post(start_job))
        .route("/jobs/:run_id", get(job_status))
        .route("/jobs/:run_id/wait", post(wait_job))
        .route("/jobs/:run_id/cancel", post(cancel_job))
        .route("/jobs/:run_id/metrics", get(job_metrics))
}

async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StartJobRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state.core.sessions.open(&id)?;
    let workspace = state.core.sessions.workspace(&id);
    let params = SynthParams {
        top_module: req.top_module,
        verilog_files: req.verilog_files,
        clock_period_ns: req.clock_period_ns.unwrap_or(10.0),
        utilization: req.utilization.unwrap_or(5),
        aspect_ratio: req.aspect_ratio.unwrap_or(1.0),
        core_margin: req.core_margin.unwrap_or(2.0),
        platform: req.platform.unwrap_or_else(|| "sky130hd".to_string()),
    };
    let run_id = state
        .core
        .jobs
        .start(&workspace, params, req.restart_stuck)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({"run_id": run_id}))))
}

async fn job_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let status = state.core.jobs.status(&run_id).await?;
    Ok(Json(serde_json::to_value(status).unwrap_or_default()))
}

async fn wait_job(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(req): Json<WaitJobRequest>,
) -> Result<Json<Value>, AppError> {
    let wait = Duration::from_secs(req.max_wait_secs.unwrap_or(120).min(600));
    let status = state.core.jobs.wait(&run_id, wait).await?;
    Ok(Json(serde_json::to_value(status).unwrap_or_default()))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.core.jobs.cancel(&run_id).await?;
    Ok(Json(json!({"run_id": run_id, "cancelled": true})))
}

async fn job_metrics(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let metrics = state.core.jobs.metrics(&run_id).await?;
    Ok(Json(serde_json::to_value(metrics).unwrap_or_default()))
}
