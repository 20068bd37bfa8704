//! Canonical event protocol for the agent loop.
//!
//! One fixed vocabulary per turn, consumed by every transport: the SSE chat
//! route, the WebSocket handler and MCP streaming all serialize exactly
//! these events. Ordering within a turn is guaranteed by the orchestrator:
//! deltas for iteration N precede tool events for iteration N, which precede
//! deltas for iteration N+1; `turn.done` or `turn.error` arrives exactly once.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct TurnUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LoopEvent {
    /// A new assistant response is beginning.
    #[serde(rename = "turn.start")]
    TurnStart { session_id: String },

    /// Incremental text chunk from the model.
    #[serde(rename = "text.delta")]
    TextDelta { content: String },

    /// Tool invocation beginning.
    #[serde(rename = "tool.call")]
    ToolCall {
        id: String,
        name: String,
        args: Value,
    },

    /// Tool invocation complete.
    #[serde(rename = "tool.result")]
    ToolResult {
        id: String,
        status: String,
        content: String,
        duration_ms: u64,
        bytes: usize,
    },

    /// Turn finished successfully.
    #[serde(rename = "turn.done")]
    TurnDone { usage: TurnUsage },

    /// Turn terminated fatally.
    #[serde(rename = "turn.error")]
    TurnError { error: String, code: String },
}

impl LoopEvent {
    pub fn error(code: &str, error: impl Into<String>) -> Self {
        LoopEvent::TurnError {
            error: error.into(),
            code: code.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_dotted_tags() {
        let event = LoopEvent::TextDelta {
            content: "hi".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text.delta");
        assert_eq!(json["content"], "hi");

        let done = LoopEvent::TurnDone {
            usage: TurnUsage {
                input_tokens: 10,
                output_tokens: 3,
            },
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["type"], "turn.done");
        assert_eq!(json["usage"]["input_tokens"], 10);
    }
}
