//! API route assembly.

pub mod chat;
pub mod files;
pub mod jobs;
pub mod mcp;
pub mod sessions;

use axum::Router;

use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(sessions::router())
        .merge(files::router())
        .merge(jobs::router())
        .merge(chat::router())
}
