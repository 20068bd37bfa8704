//! Session CRUD endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::error::AppError;
use crate::types::{CreateSessionRequest, SessionDetailResponse, SessionResponse, TurnResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
}

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = state.core.sessions.list()?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let name = req.name.as_deref().unwrap_or(&req.id);
    let model = req
        .model
        .as_deref()
        .unwrap_or(&state.core.config.model);
    let info = state.core.sessions.create(&req.id, name, model).await?;
    Ok((StatusCode::CREATED, Json(info.into())))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    let info = state.core.sessions.open(&id)?;
    let turns = state
        .core
        .sessions
        .history(&id)?
        .into_iter()
        .map(|turn| TurnResponse {
            role: turn.role.as_str().to_string(),
            content: serde_json::to_value(&turn.content).unwrap_or_default(),
        })
        .collect();
    Ok(Json(SessionDetailResponse {
        session: info.into(),
        turns,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.core.sessions.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
