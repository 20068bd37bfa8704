//! Model stream consumption for one loop iteration.
//!
//! Drains `StreamPart`s from the provider adapter, forwards text deltas to
//! the bus as they arrive, and accumulates the pieces the loop needs: the
//! assistant text, the tool calls in emission order, and usage.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::loop_events::LoopEvent;
use crate::ai::streaming::StreamPart;
use crate::ai::types::{AiToolCall, Usage};
use crate::bus::EventBus;
use crate::error::CoreError;

/// No data for this long means the provider stream is dead.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) struct StreamOutcome {
    pub text: String,
    pub tool_calls: Vec<AiToolCall>,
    pub usage: Option<Usage>,
    /// Set when the stream ended abnormally. Accumulated text is still valid
    /// so a cancelled turn can persist its partial assistant output.
    pub error: Option<CoreError>,
}

pub(crate) async fn consume_stream(
    mut rx: mpsc::UnboundedReceiver<StreamPart>,
    bus: &EventBus,
    session_id: &str,
    cancel: &CancellationToken,
) -> StreamOutcome {
    let mut outcome = StreamOutcome {
        text: String::new(),
        tool_calls: Vec::new(),
        usage: None,
        error: None,
    };

    loop {
        let part = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome.error = Some(CoreError::Cancelled);
                break;
            }
            part = tokio::time::timeout(STREAM_IDLE_TIMEOUT, rx.recv()) => match part {
                Ok(Some(part)) => part,
                Ok(None) => break,
                Err(_) => {
                    outcome.error = Some(CoreError::Provider(
                        "model stream idle for 120s".to_string(),
                    ));
                    break;
                }
            },
        };

        match part {
            StreamPart::TextDelta { delta } => {
                outcome.text.push_str(&delta);
                bus.publish(session_id, LoopEvent::TextDelta { content: delta })
                    .await;
            }
            StreamPart::ToolCallStart { .. } => {}
            StreamPart::ToolCallComplete { call } => outcome.tool_calls.push(call),
            StreamPart::Usage { usage: u } => outcome.usage = Some(u),
            StreamPart::Finish => break,
            StreamPart::Error { error } => {
                outcome.error = Some(CoreError::Provider(error));
                break;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parts_channel(parts: Vec<StreamPart>) -> mpsc::UnboundedReceiver<StreamPart> {
        let (tx, rx) = mpsc::unbounded_channel();
        for part in parts {
            tx.send(part).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn accumulates_text_and_tool_calls() {
        let bus = EventBus::new();
        let rx = parts_channel(vec![
            StreamPart::TextDelta { delta: "I'll ".into() },
            StreamPart::TextDelta { delta: "lint it.".into() },
            StreamPart::ToolCallComplete {
                call: AiToolCall {
                    id: "c1".into(),
                    name: "linter_tool".into(),
                    arguments: json!({"file_path": "a.v"}),
                },
            },
            StreamPart::Usage {
                usage: Usage {
                    input_tokens: 9,
                    output_tokens: 4,
                },
            },
            StreamPart::Finish,
        ]);

        let outcome = consume_stream(rx, &bus, "s1", &CancellationToken::new()).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.text, "I'll lint it.");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.usage.unwrap().input_tokens, 9);
    }

    #[tokio::test]
    async fn stream_error_is_a_provider_error() {
        let bus = EventBus::new();
        let rx = parts_channel(vec![StreamPart::Error {
            error: "overloaded".into(),
        }]);
        let outcome = consume_stream(rx, &bus, "s1", &CancellationToken::new()).await;
        assert!(matches!(outcome.error, Some(CoreError::Provider(_))));
    }

    #[tokio::test]
    async fn partial_text_survives_abnormal_end() {
        let bus = EventBus::new();
        let rx = parts_channel(vec![
            StreamPart::TextDelta {
                delta: "partial".into(),
            },
            StreamPart::Error {
                error: "connection reset".into(),
            },
        ]);
        let outcome = consume_stream(rx, &bus, "s1", &CancellationToken::new()).await;
        assert_eq!(outcome.text, "partial");
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_stream() {
        let bus = EventBus::new();
        let (_tx, rx) = mpsc::unbounded_channel::<StreamPart>();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = consume_stream(rx, &bus, "s1", &cancel).await;
        assert!(matches!(outcome.error, Some(CoreError::Cancelled)));
    }

    #[tokio::test]
    async fn deltas_are_forwarded_to_the_bus() {
        let bus = EventBus::new();
        let (_id, mut events) = bus.subscribe("s1", 8).await;
        let rx = parts_channel(vec![
            StreamPart::TextDelta { delta: "hi".into() },
            StreamPart::Finish,
        ]);
        let outcome = consume_stream(rx, &bus, "s1", &CancellationToken::new()).await;
        assert!(outcome.error.is_none());
        match events.recv().await {
            Some(LoopEvent::TextDelta { content }) => assert_eq!(content, "hi"),
            other => panic!("expected delta, got {:?}", other),
        }
    }
}
