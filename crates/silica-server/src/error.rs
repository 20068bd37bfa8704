//! HTTP error mapping.
//!
//! Every core error kind maps to a stable code and status. Messages are the
//! core's own; they never contain paths outside a session workspace.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use silica_core::CoreError;

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

pub struct AppError(pub CoreError);

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::SessionNotFound(_) | CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::SessionConflict(_)
            | CoreError::JobConflict(_)
            | CoreError::ConflictNotFound(_) => StatusCode::CONFLICT,
            CoreError::BadArgs(_)
            | CoreError::WorkspacePathEscape(_)
            | CoreError::FileTooLarge { .. } => StatusCode::BAD_REQUEST,
            CoreError::ToolNotVisible(_) => StatusCode::FORBIDDEN,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Cancelled => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {}", self.0);
        }
        (
            status,
            Json(ApiError {
                error: self.0.to_string(),
                code: self.0.code().to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_kinds_map_to_409() {
        let resp = AppError(CoreError::JobConflict("busy".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn unknown_session_is_404() {
        let resp = AppError(CoreError::SessionNotFound("x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
