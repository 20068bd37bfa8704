//! Silica server
//!
//! HTTP transports over one shared core: REST session/file/job control, an
//! SSE chat stream, a WebSocket chat stream, and the MCP server over
//! streamable HTTP and SSE framings. This is a library crate; start it via
//! `start_server()`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::response::sse::Event;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use silica_core::mcp::McpServer;
use silica_core::Core;

pub mod error;
pub mod routes;
pub mod types;
pub mod ws;

type McpConnections = Arc<RwLock<HashMap<String, mpsc::Sender<Result<Event, Infallible>>>>>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Core>,
    pub mcp: Arc<McpServer>,
    /// Live MCP SSE connections, keyed by connection id.
    pub mcp_connections: McpConnections,
}

/// Configuration for starting the server.
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Build the router and state around an assembled core.
pub fn build_router(core: Arc<Core>) -> (Router, AppState) {
    let state = AppState {
        mcp: Arc::new(core.mcp_server()),
        core,
        mcp_connections: Arc::new(RwLock::new(HashMap::new())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws/chat/:session_id", get(ws::handler))
        .nest("/api", routes::api_router())
        .nest("/mcp", routes::mcp::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

/// Start the server and block until shutdown.
pub async fn start_server(core: Arc<Core>, config: ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let (app, _state) = build_router(core);

    tracing::info!("silica server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}
