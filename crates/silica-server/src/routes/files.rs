//! Workspace file access: classified listing, typed reads, raw reads.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use silica_core::workspace::ArtifactKind;
use silica_core::CoreError;

use crate::error::AppError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions/:id/files", get(list_files))
        .route("/sessions/:id/files/*path", get(read_file))
        .route("/sessions/:id/spec", get(read_spec))
        .route("/sessions/:id/report", get(read_report))
}

#[derive(Serialize)]
struct FileEntry {
    path: String,
    kind: String,
    size: u64,
    modified: String,
}

async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FileEntry>>, AppError> {
    state.core.sessions.open(&id)?;
    let entries = state
        .core
        .sessions
        .workspace(&id)
        .list_files(None)
        .await?
        .into_iter()
        .map(|e| FileEntry {
            path: e.path,
            kind: e.kind.as_str().to_string(),
            size: e.size,
            modified: e.modified.to_rfc3339(),
        })
        .collect();
    Ok(Json(entries))
}

async fn read_file(
    State(state): State<AppState>,
    Path((id, path)): Path<(String, String)>,
) -> Result<String, AppError> {
    state.core.sessions.open(&id)?;
    let content = state
        .core
        .sessions
        .workspace(&id)
        .read_to_string(&path)
        .await?;
    Ok(content)
}

async fn read_latest(state: &AppState, id: &str, kind: ArtifactKind) -> Result<String, AppError> {
    state.core.sessions.open(id)?;
    let workspace = state.core.sessions.workspace(id);
    let entry = workspace
        .latest_of_kind(kind)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("no {} artifact", kind.as_str())))?;
    Ok(workspace.read_to_string(&entry.path).await?)
}

async fn read_spec(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<String, AppError> {
    read_latest(&state, &id, ArtifactKind::Spec).await
}

async fn read_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<String, AppError> {
    read_latest(&state, &id, ArtifactKind::Report).await
}
