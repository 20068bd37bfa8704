//! MCP server: the tool-protocol transport.
//!
//! Exposes the full registry (under the mcp transport's session filter) as
//! externally-callable tools, the fixed workflow prompt, and a sessions
//! resource. The handler is framing-agnostic: `run_stdio` drives it over
//! newline-delimited JSON-RPC, and the HTTP server reuses `handle` for its
//! SSE and streamable-HTTP endpoints.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::protocol::{error_codes, JsonRpcRequest, JsonRpcResponse, McpToolDef, PROTOCOL_VERSION};
use crate::agent::ToolExecutor;
use crate::ai::types::AiToolCall;
use crate::config::CoreConfig;
use crate::error::Result;
use crate::prompt::SYSTEM_PROMPT;
use crate::session::SessionManager;

pub const TRANSPORT_TAG: &str = "mcp";
const SERVER_NAME: &str = "silica";
const WORKFLOW_PROMPT_NAME: &str = "rtl_design_workflow";
const SESSIONS_RESOURCE_URI: &str = "silica://sessions";

pub struct McpServer {
    executor: Arc<ToolExecutor>,
    sessions: Arc<SessionManager>,
    config: Arc<CoreConfig>,
}

impl McpServer {
    pub fn new(
        executor: Arc<ToolExecutor>,
        sessions: Arc<SessionManager>,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self {
            executor,
            sessions,
            config,
        }
    }

    /// Handle one request. Notifications yield no response.
    pub async fn handle(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if req.is_notification() {
            tracing::debug!(method = %req.method, "mcp notification");
            return None;
        }
        let id = req.id.clone().unwrap_or(Value::Null);

        let response = match req.method.as_str() {
            "initialize" => JsonRpcResponse::ok(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {
                        "tools": {},
                        "prompts": {},
                        "resources": {}
                    },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ),
            "ping" => JsonRpcResponse::ok(id, json!({})),
            "tools/list" => self.tools_list(id).await,
            "tools/call" => self.tools_call(id, req.params).await,
            "prompts/list" => JsonRpcResponse::ok(
                id,
                json!({
                    "prompts": [{
                        "name": WORKFLOW_PROMPT_NAME,
                        "description": "Expert RTL design workflow: spec, RTL, lint, simulate, debug, synthesize, report.",
                        "arguments": [{
                            "name": "session_id",
                            "description": "Session to work in (created when absent)",
                            "required": false
                        }]
                    }]
                }),
            ),
            "prompts/get" => self.prompts_get(id, req.params).await,
            "resources/list" => JsonRpcResponse::ok(
                id,
                json!({
                    "resources": [{
                        "uri": SESSIONS_RESOURCE_URI,
                        "name": "Design sessions",
                        "description": "All sessions with usage metadata",
                        "mimeType": "application/json"
                    }]
                }),
            ),
            "resources/read" => self.resources_read(id, req.params).await,
            other => JsonRpcResponse::err(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("unknown method '{}'", other),
            ),
        };

        Some(response)
    }

    async fn current_session(&self) -> Result<String> {
        let info = self
            .sessions
            .current_or_create(TRANSPORT_TAG, &self.config.model)
            .await?;
        Ok(info.id)
    }

    async fn tools_list(&self, id: Value) -> JsonRpcResponse {
        let session = match self.current_session().await {
            Ok(session) => session,
            Err(e) => return JsonRpcResponse::err(id, error_codes::INTERNAL_ERROR, e.to_string()),
        };
        let tools: Vec<McpToolDef> = self
            .executor
            .registry
            .visible_tools(&session)
            .await
            .into_iter()
            .map(|t| McpToolDef {
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
            })
            .collect();
        JsonRpcResponse::ok(id, json!({ "tools": tools }))
    }

    async fn tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::err(id, error_codes::INVALID_PARAMS, "missing params");
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::err(id, error_codes::INVALID_PARAMS, "missing tool name");
        };
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let session = match self.current_session().await {
            Ok(session) => session,
            Err(e) => return JsonRpcResponse::err(id, error_codes::INTERNAL_ERROR, e.to_string()),
        };

        let call = AiToolCall {
            id: format!("mcp-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            arguments,
        };
        let done = self
            .executor
            .execute(&session, TRANSPORT_TAG, &call, CancellationToken::new())
            .await;

        JsonRpcResponse::ok(
            id,
            json!({
                "content": [{"type": "text", "text": done.result.output}],
                "isError": done.result.is_error
            }),
        )
    }

    async fn prompts_get(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let name = params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if name != WORKFLOW_PROMPT_NAME {
            return JsonRpcResponse::err(
                id,
                error_codes::INVALID_PARAMS,
                format!("unknown prompt '{}'", name),
            );
        }

        let requested = params
            .as_ref()
            .and_then(|p| p.pointer("/arguments/session_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let session = match requested {
            Some(session_id) => {
                if let Err(e) = self.sessions.set_active(TRANSPORT_TAG, &session_id).await {
                    return JsonRpcResponse::err(id, error_codes::INVALID_PARAMS, e.to_string());
                }
                session_id
            }
            None => match self.current_session().await {
                Ok(session) => session,
                Err(e) => {
                    return JsonRpcResponse::err(id, error_codes::INTERNAL_ERROR, e.to_string())
                }
            },
        };

        let text = format!(
            "{}\n\nCURRENT SESSION: {}\nAll tools operate in this session's workspace. \
             Switch with set_active_session; inspect with get_current_session.",
            SYSTEM_PROMPT, session
        );
        JsonRpcResponse::ok(
            id,
            json!({
                "description": "RTL design workflow prompt",
                "messages": [{
                    "role": "user",
                    "content": {"type": "text", "text": text}
                }]
            }),
        )
    }

    async fn resources_read(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let uri = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if uri != SESSIONS_RESOURCE_URI {
            return JsonRpcResponse::err(
                id,
                error_codes::INVALID_PARAMS,
                format!("unknown resource '{}'", uri),
            );
        }

        let sessions = match self.sessions.list() {
            Ok(sessions) => sessions,
            Err(e) => return JsonRpcResponse::err(id, error_codes::INTERNAL_ERROR, e.to_string()),
        };
        let listing: Vec<Value> = sessions
            .iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "name": s.name,
                    "model": s.model,
                    "updated_at": s.updated_at.to_rfc3339(),
                    "input_tokens": s.input_tokens,
                    "output_tokens": s.output_tokens,
                    "cost_usd": s.cost_usd
                })
            })
            .collect();

        JsonRpcResponse::ok(
            id,
            json!({
                "contents": [{
                    "uri": SESSIONS_RESOURCE_URI,
                    "mimeType": "application/json",
                    "text": serde_json::to_string_pretty(&listing).unwrap_or_default()
                }]
            }),
        )
    }

    /// One-shot stdio framing: newline-delimited JSON-RPC on stdin/stdout.
    pub async fn run_stdio(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        tracing::info!("mcp server listening on stdio");
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(req) => self.handle(req).await,
                Err(e) => Some(JsonRpcResponse::err(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    e.to_string(),
                )),
            };
            if let Some(response) = response {
                let mut body = serde_json::to_vec(&response)
                    .map_err(|e| crate::error::CoreError::Io(e.to_string()))?;
                body.push(b'\n');
                stdout.write_all(&body).await?;
                stdout.flush().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::synth::JobSupervisor;
    use crate::tools::implementations::register_all_tools;
    use crate::tools::registry::{FilterMode, ToolRegistry};
    use tempfile::TempDir;

    async fn server(dir: &TempDir) -> McpServer {
        let config = Arc::new(CoreConfig::default());
        let sessions = Arc::new(SessionManager::new(
            dir.path().join("state.db"),
            dir.path().join("workspace"),
        ));
        let registry = Arc::new(ToolRegistry::new(FilterMode::All));
        register_all_tools(&registry).await;
        let executor = Arc::new(ToolExecutor {
            registry,
            sessions: sessions.clone(),
            jobs: Arc::new(JobSupervisor::new(config.clone())),
            bus: Arc::new(EventBus::new()),
            config: config.clone(),
        });
        McpServer::new(executor, sessions, config)
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_capabilities() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let response = server
            .handle(request("initialize", json!({})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "silica");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_exposes_the_catalog() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let response = server.handle(request("tools/list", json!({}))).await.unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 26);
    }

    #[tokio::test]
    async fn tools_call_runs_against_the_mcp_session() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let response = server
            .handle(request(
                "tools/call",
                json!({"name": "write_file", "arguments": {"path": "a.v", "content": "module a; endmodule"}}),
            ))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);

        // The write landed in the transport's lazily created session.
        let session = server.sessions.current_of(TRANSPORT_TAG).await.unwrap();
        let content = server
            .sessions
            .workspace(&session)
            .read_to_string("a.v")
            .await
            .unwrap();
        assert!(content.contains("module a"));
    }

    #[tokio::test]
    async fn workflow_prompt_carries_the_session() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let response = server
            .handle(request("prompts/get", json!({"name": "rtl_design_workflow"})))
            .await
            .unwrap();
        let text = response.result.unwrap()["messages"][0]["content"]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("CURRENT SESSION"));
        assert!(text.contains("write_spec"));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let response = server.handle(request("bogus/method", json!({}))).await.unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let note: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(server.handle(note).await.is_none());
    }
}
