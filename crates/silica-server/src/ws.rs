//! WebSocket chat transport.
//!
//! A connection is scoped to one session. The client sends `{"message": ...}`
//! frames; for each one the server runs a turn and forwards the event stream
//! as JSON text frames until `turn.done` or `turn.error`. Closing the socket
//! cancels the in-flight turn. Connections never replay past events; durable
//! history is the REST session detail endpoint.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use tokio_util::sync::CancellationToken;

use silica_core::LoopEvent;

use crate::types::WsClientMessage;
use crate::AppState;

pub const TRANSPORT_TAG: &str = "ws";
const WS_QUEUE: usize = 256;

pub async fn handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection(socket, state, session_id))
}

async fn connection(mut socket: WebSocket, state: AppState, session_id: String) {
    if state.core.sessions.open(&session_id).is_err() {
        let _ = socket
            .send(Message::Text(
                serde_json::json!({
                    "type": "turn.error",
                    "error": format!("session '{}' not found", session_id),
                    "code": "SessionNotFound"
                })
                .to_string(),
            ))
            .await;
        return;
    }
    if let Err(e) = state.core.sessions.set_active(TRANSPORT_TAG, &session_id).await {
        tracing::warn!(session_id, "failed to set ws cursor: {}", e);
    }

    tracing::info!(session_id, "websocket chat connected");

    while let Some(Ok(frame)) = socket.recv().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(client_msg) = serde_json::from_str::<WsClientMessage>(&text) else {
            let _ = socket
                .send(Message::Text(
                    serde_json::json!({
                        "type": "turn.error",
                        "error": "expected {\"message\": string}",
                        "code": "BadArgs"
                    })
                    .to_string(),
                ))
                .await;
            continue;
        };

        let cancel = CancellationToken::new();
        let (sub_id, mut events) = state.core.bus.subscribe(&session_id, WS_QUEUE).await;

        let agent = state.core.agent.clone();
        let turn_session = session_id.clone();
        let turn_cancel = cancel.clone();
        let turn = tokio::spawn(async move {
            let _ = agent
                .run_turn(&turn_session, TRANSPORT_TAG, client_msg.message, turn_cancel)
                .await;
        });

        // Forward until the turn settles; a failed send means the client
        // dropped mid-turn.
        let mut client_gone = false;
        while let Some(event) = events.recv().await {
            let terminal = matches!(
                event,
                LoopEvent::TurnDone { .. } | LoopEvent::TurnError { .. }
            );
            let data = match serde_json::to_string(&event) {
                Ok(data) => data,
                Err(_) => continue,
            };
            if socket.send(Message::Text(data)).await.is_err() {
                cancel.cancel();
                client_gone = true;
                break;
            }
            if terminal {
                break;
            }
        }

        state.core.bus.unsubscribe(&session_id, sub_id).await;
        if client_gone {
            let _ = turn.await;
            break;
        }
    }

    state.core.sessions.clear_active(TRANSPORT_TAG).await;
    tracing::info!(session_id, "websocket chat disconnected");
}
