//! Chat endpoint: one user message in, the turn's event stream out (SSE).
//!
//! Each request is a fresh bus subscription; there is no replay of earlier
//! events. Client disconnect cancels the in-flight turn, which propagates to
//! the model stream and any running subprocess tree.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use silica_core::bus::DEFAULT_QUEUE_CAPACITY;
use silica_core::LoopEvent;

use crate::error::AppError;
use crate::types::ChatRequest;
use crate::AppState;

pub const TRANSPORT_TAG: &str = "web";
const SSE_CHANNEL_BUFFER: usize = DEFAULT_QUEUE_CAPACITY;

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session_id = match req.session_id {
        Some(id) => {
            state.core.sessions.open(&id)?;
            id
        }
        None => {
            state
                .core
                .sessions
                .current_or_create(TRANSPORT_TAG, &state.core.config.model)
                .await?
                .id
        }
    };

    let cancel = CancellationToken::new();
    let (sse_tx, sse_rx) = mpsc::channel::<Result<Event, Infallible>>(SSE_CHANNEL_BUFFER);

    let (sub_id, mut events) = state.core.bus.subscribe(&session_id, SSE_CHANNEL_BUFFER).await;

    // Forward bus events to the SSE channel; a send failure means the client
    // went away, which cancels the turn.
    let forward_bus = state.core.bus.clone();
    let forward_session = session_id.clone();
    let forward_cancel = cancel.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let terminal = matches!(
                event,
                LoopEvent::TurnDone { .. } | LoopEvent::TurnError { .. }
            );
            let data = match serde_json::to_string(&event) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!("failed to serialize loop event: {}", e);
                    continue;
                }
            };
            if sse_tx.send(Ok(Event::default().data(data))).await.is_err() {
                tracing::info!(session_id = %forward_session, "chat client disconnected, cancelling turn");
                forward_cancel.cancel();
                break;
            }
            if terminal {
                break;
            }
        }
        forward_bus.unsubscribe(&forward_session, sub_id).await;
    });

    let agent = state.core.agent.clone();
    let turn_session = session_id.clone();
    let turn_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = agent
            .run_turn(&turn_session, TRANSPORT_TAG, req.message, turn_cancel)
            .await
        {
            tracing::warn!(session_id = %turn_session, "turn ended with error: {}", e);
        }
    });

    Ok(Sse::new(ReceiverStream::new(sse_rx)).keep_alive(KeepAlive::default()))
}
