//! Streaming model client.
//!
//! The core depends only on the `ModelClient` trait; `HttpModelClient` is the
//! single provider adapter, translating the provider's SSE event stream into
//! the pull-style `StreamPart` channel the agent loop consumes.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::ai::streaming::StreamPart;
use crate::ai::types::{AiTool, AiToolCall, Content, ModelMessage, Role, Usage};
use crate::error::{CoreError, Result};

const DEFAULT_MAX_TOKENS: u32 = 8192;
const API_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait ModelClient: Send + Sync {
    fn model(&self) -> &str;

    /// Start a streaming chat call. Parts arrive on the returned channel;
    /// the channel closing without `Finish` or `Error` means the adapter
    /// task died and is treated as a provider error by the consumer.
    async fn stream_chat(
        &self,
        system: &str,
        messages: &[ModelMessage],
        tools: &[AiTool],
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>>;
}

#[derive(Debug, Clone)]
pub struct ModelClientConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub max_tokens: u32,
}

impl ModelClientConfig {
    pub fn new(model: &str, base_url: &str, api_key: &str) -> Self {
        Self {
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

pub struct HttpModelClient {
    config: ModelClientConfig,
    http: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(config: ModelClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_body(&self, system: &str, messages: &[ModelMessage], tools: &[AiTool]) -> Value {
        let rendered: Vec<Value> = messages.iter().map(render_message).collect();
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system,
            "messages": rendered,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect(),
            );
        }
        body
    }
}

/// Map a stored turn onto the provider's message shape. Tool-result turns
/// ride as user messages carrying `tool_result` blocks.
fn render_message(msg: &ModelMessage) -> Value {
    let role = match msg.role {
        Role::Assistant => "assistant",
        Role::User | Role::Tool => "user",
    };
    let content: Vec<Value> = msg
        .content
        .iter()
        .map(|block| match block {
            Content::Text { text } => json!({"type": "text", "text": text}),
            Content::ToolUse { id, name, input } => {
                json!({"type": "tool_use", "id": id, "name": name, "input": input})
            }
            Content::ToolResult {
                tool_use_id,
                output,
                is_error,
            } => {
                let mut v = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": output,
                });
                if is_error.unwrap_or(false) {
                    v["is_error"] = Value::Bool(true);
                }
                v
            }
        })
        .collect();
    json!({"role": role, "content": content})
}

#[async_trait]
impl ModelClient for HttpModelClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream_chat(
        &self,
        system: &str,
        messages: &[ModelMessage],
        tools: &[AiTool],
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>> {
        let body = self.build_body(system, messages, tools);
        let url = format!("{}/v1/messages", self.config.base_url);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Provider(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(CoreError::Provider(format!("{}: {}", status, text)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut parser = SseEventParser::default();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for part in parser.feed(&bytes) {
                            if tx.send(part).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamPart::Error {
                            error: format!("stream read error: {}", e),
                        });
                        return;
                    }
                }
            }
            let _ = tx.send(StreamPart::Finish);
        });

        Ok(rx)
    }
}

/// Incremental SSE parser for the provider's `messages` stream.
#[derive(Default)]
struct SseEventParser {
    buffer: String,
    /// In-flight tool call: (id, name, accumulated argument JSON).
    pending_tool: Option<(String, String, String)>,
    usage: Usage,
    usage_sent: bool,
}

impl SseEventParser {
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamPart> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut parts = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let event: String = self.buffer.drain(..pos + 2).collect();
            for line in event.lines() {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }
                let Ok(value) = serde_json::from_str::<Value>(data) else {
                    continue;
                };
                self.handle_event(&value, &mut parts);
            }
        }

        parts
    }

    fn handle_event(&mut self, event: &Value, out: &mut Vec<StreamPart>) {
        match event.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                if let Some(n) = event
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.input_tokens = n as usize;
                }
            }
            Some("content_block_start") => {
                let block = &event["content_block"];
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let id = block["id"].as_str().unwrap_or_default().to_string();
                    let name = block["name"].as_str().unwrap_or_default().to_string();
                    out.push(StreamPart::ToolCallStart {
                        id: id.clone(),
                        name: name.clone(),
                    });
                    self.pending_tool = Some((id, name, String::new()));
                }
            }
            Some("content_block_delta") => {
                let delta = &event["delta"];
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str() {
                            out.push(StreamPart::TextDelta {
                                delta: text.to_string(),
                            });
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some((_, _, ref mut args)) = self.pending_tool {
                            args.push_str(delta["partial_json"].as_str().unwrap_or_default());
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_stop") => {
                if let Some((id, name, args)) = self.pending_tool.take() {
                    let arguments = if args.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&args).unwrap_or_else(|_| json!({}))
                    };
                    out.push(StreamPart::ToolCallComplete {
                        call: AiToolCall { id, name, arguments },
                    });
                }
            }
            Some("message_delta") => {
                if let Some(n) = event
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.output_tokens = n as usize;
                }
            }
            Some("message_stop") => {
                if !self.usage_sent {
                    self.usage_sent = true;
                    out.push(StreamPart::Usage { usage: self.usage });
                }
                out.push(StreamPart::Finish);
            }
            Some("error") => {
                let msg = event
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown provider error");
                out.push(StreamPart::Error {
                    error: msg.to_string(),
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut SseEventParser, events: &[&str]) -> Vec<StreamPart> {
        let mut parts = Vec::new();
        for e in events {
            parts.extend(parser.feed(format!("data: {}\n\n", e).as_bytes()));
        }
        parts
    }

    #[test]
    fn parses_text_deltas() {
        let mut parser = SseEventParser::default();
        let parts = feed_all(
            &mut parser,
            &[
                r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"hel"}}"#,
                r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"lo"}}"#,
            ],
        );
        let text: String = parts
            .iter()
            .filter_map(|p| match p {
                StreamPart::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "hello");
    }

    #[test]
    fn accumulates_tool_call_arguments() {
        let mut parser = SseEventParser::default();
        let parts = feed_all(
            &mut parser,
            &[
                r#"{"type":"content_block_start","content_block":{"type":"tool_use","id":"call_9","name":"linter_tool"}}"#,
                r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{\"file_path\":"}}"#,
                r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"\"counter.v\"}"}}"#,
                r#"{"type":"content_block_stop"}"#,
            ],
        );
        let call = parts
            .iter()
            .find_map(|p| match p {
                StreamPart::ToolCallComplete { call } => Some(call.clone()),
                _ => None,
            })
            .expect("tool call completed");
        assert_eq!(call.id, "call_9");
        assert_eq!(call.name, "linter_tool");
        assert_eq!(call.arguments["file_path"], "counter.v");
    }

    #[test]
    fn reports_usage_before_finish() {
        let mut parser = SseEventParser::default();
        let parts = feed_all(
            &mut parser,
            &[
                r#"{"type":"message_start","message":{"usage":{"input_tokens":120}}}"#,
                r#"{"type":"message_delta","usage":{"output_tokens":33}}"#,
                r#"{"type":"message_stop"}"#,
            ],
        );
        let usage = parts
            .iter()
            .find_map(|p| match p {
                StreamPart::Usage { usage } => Some(*usage),
                _ => None,
            })
            .expect("usage part");
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 33);
        assert!(matches!(parts.last(), Some(StreamPart::Finish)));
    }

    #[test]
    fn tool_result_turns_render_as_user_messages() {
        let msg = ModelMessage {
            role: Role::Tool,
            content: vec![Content::ToolResult {
                tool_use_id: "call_1".into(),
                output: "Syntax OK.".into(),
                is_error: None,
            }],
        };
        let rendered = render_message(&msg);
        assert_eq!(rendered["role"], "user");
        assert_eq!(rendered["content"][0]["type"], "tool_result");
    }
}
