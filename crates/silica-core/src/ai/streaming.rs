//! Stream protocol between the provider adapter and the agent loop.

use crate::ai::types::{AiToolCall, Usage};

/// Parts of a streaming model response, in arrival order.
///
/// Provider adapters translate their own callback or SSE event model into
/// this vocabulary; the loop consumes only `StreamPart`.
#[derive(Debug, Clone)]
pub enum StreamPart {
    /// Incremental text chunk.
    TextDelta { delta: String },
    /// A tool call began streaming (arguments not yet complete).
    ToolCallStart { id: String, name: String },
    /// Tool call fully received.
    ToolCallComplete { call: AiToolCall },
    /// Token accounting for the call.
    Usage { usage: Usage },
    /// The stream finished normally.
    Finish,
    /// The stream died; the loop treats this as a provider error.
    Error { error: String },
}
