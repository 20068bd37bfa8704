//! HTTP framings for the MCP server: streamable HTTP and SSE.
//!
//! Both reuse the core `McpServer` handler; only the framing differs.
//! - `POST /mcp` — streamable HTTP: one JSON-RPC request per POST, the
//!   response in the body (204 for notifications).
//! - `GET /mcp/sse` + `POST /mcp/message?connection_id=…` — SSE pairing: the
//!   GET opens the event stream and announces the message endpoint; responses
//!   to posted requests arrive as SSE events on that stream.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use silica_core::mcp::{JsonRpcRequest, JsonRpcResponse};

use crate::AppState;

const SSE_QUEUE: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(streamable_http))
        .route("/sse", get(sse_connect))
        .route("/message", post(sse_message))
}

async fn streamable_http(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let request: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            let response = JsonRpcResponse::err(Value::Null, -32700, e.to_string());
            return (StatusCode::OK, Json(serde_json::to_value(response).unwrap_or_default()))
                .into_response();
        }
    };

    match state.mcp.handle(request).await {
        Some(response) => (
            StatusCode::OK,
            Json(serde_json::to_value(response).unwrap_or_default()),
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn sse_connect(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let connection_id = format!("conn-{}", uuid::Uuid::new_v4());
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(SSE_QUEUE);

    // First event tells the client where to POST its requests.
    let endpoint = format!("/mcp/message?connection_id={}", connection_id);
    let _ = tx
        .send(Ok(Event::default().event("endpoint").data(endpoint)))
        .await;

    state
        .mcp_connections
        .write()
        .await
        .insert(connection_id.clone(), tx);
    tracing::info!(connection_id, "mcp sse client connected");

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
pub struct MessageQuery {
    connection_id: String,
}

async fn sse_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Json(body): Json<Value>,
) -> StatusCode {
    let Some(tx) = state
        .mcp_connections
        .read()
        .await
        .get(&query.connection_id)
        .cloned()
    else {
        return StatusCode::NOT_FOUND;
    };

    let request: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(_) => return StatusCode::BAD_REQUEST,
    };

    if let Some(response) = state.mcp.handle(request).await {
        let data = serde_json::to_string(&response).unwrap_or_default();
        if tx
            .send(Ok(Event::default().event("message").data(data)))
            .await
            .is_err()
        {
            state
                .mcp_connections
                .write()
                .await
                .remove(&query.connection_id);
            return StatusCode::GONE;
        }
    }
    StatusCode::ACCEPTED
}
