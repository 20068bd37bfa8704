//! Model-provider interface: message types, stream protocol, client.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::{HttpModelClient, ModelClient, ModelClientConfig};
pub use streaming::StreamPart;
pub use types::{estimate_tokens, AiTool, AiToolCall, Content, ModelMessage, Role, Usage};
