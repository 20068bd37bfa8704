//! Session management tools, visible under every filter mode.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};

pub struct CreateSessionTool;

#[derive(Deserialize)]
struct CreateParams {
    session_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[async_trait]
impl Tool for CreateSessionTool {
    fn name(&self) -> &str {
        "create_session"
    }

    fn description(&self) -> &str {
        "Create a new isolated design session with its own workspace, and make it this transport's current session."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "Unique id, e.g. 'counter-design'"},
                "name": {"type": "string", "description": "Display name (defaults to the id)"},
                "model": {"type": "string", "description": "Model identifier for this session"}
            },
            "required": ["session_id"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Session
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<CreateParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let name = params.name.unwrap_or_else(|| params.session_id.clone());
        let model = params
            .model
            .unwrap_or_else(|| ctx.config.model.clone());

        match ctx.sessions.create(&params.session_id, &name, &model).await {
            Ok(info) => {
                if let Err(e) = ctx.sessions.set_active(&ctx.transport, &info.id).await {
                    return e.into();
                }
                ToolResult::success(format!(
                    "Created session '{}' and made it current for this transport.",
                    info.id
                ))
            }
            Err(e) => e.into(),
        }
    }
}

pub struct ListSessionsTool;

#[async_trait]
impl Tool for ListSessionsTool {
    fn name(&self) -> &str {
        "list_sessions"
    }

    fn description(&self) -> &str {
        "List all sessions with model, last update and token totals."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Session
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        match ctx.sessions.list() {
            Ok(sessions) if sessions.is_empty() => {
                ToolResult::success("No sessions. Create one with create_session.")
            }
            Ok(sessions) => {
                let current = ctx.sessions.current_of(&ctx.transport).await;
                let mut out = String::from("id\tmodel\tupdated\ttokens\n");
                for s in sessions {
                    let marker = if current.as_deref() == Some(s.id.as_str()) {
                        " (current)"
                    } else {
                        ""
                    };
                    out.push_str(&format!(
                        "{}{}\t{}\t{}\t{}\n",
                        s.id,
                        marker,
                        s.model,
                        s.updated_at.to_rfc3339(),
                        s.input_tokens + s.output_tokens
                    ));
                }
                ToolResult::success(out)
            }
            Err(e) => e.into(),
        }
    }
}

pub struct SetActiveSessionTool;

#[derive(Deserialize)]
struct SessionIdParams {
    session_id: String,
}

#[async_trait]
impl Tool for SetActiveSessionTool {
    fn name(&self) -> &str {
        "set_active_session"
    }

    fn description(&self) -> &str {
        "Switch this transport's current session. Subsequent tool calls operate in that session's workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string"}
            },
            "required": ["session_id"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Session
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<SessionIdParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx
            .sessions
            .set_active(&ctx.transport, &params.session_id)
            .await
        {
            Ok(()) => ToolResult::success(format!(
                "Session '{}' is now current for this transport.",
                params.session_id
            )),
            Err(e) => e.into(),
        }
    }
}

pub struct GetCurrentSessionTool;

#[async_trait]
impl Tool for GetCurrentSessionTool {
    fn name(&self) -> &str {
        "get_current_session"
    }

    fn description(&self) -> &str {
        "Report this transport's current session id and workspace usage totals."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Session
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        match ctx.sessions.current_of(&ctx.transport).await {
            Some(id) => match ctx.sessions.open(&id) {
                Ok(info) => ToolResult::success(format!(
                    "session_id: {}\nmodel: {}\ninput_tokens: {}\noutput_tokens: {}\ncost_usd: {:.4}\n",
                    info.id, info.model, info.input_tokens, info.output_tokens, info.cost_usd
                )),
                Err(e) => e.into(),
            },
            None => ToolResult::success(
                "No current session for this transport. Use create_session or set_active_session.",
            ),
        }
    }
}

pub struct DeleteSessionTool;

#[async_trait]
impl Tool for DeleteSessionTool {
    fn name(&self) -> &str {
        "delete_session"
    }

    fn description(&self) -> &str {
        "Delete a session, its history and its workspace. Refused while the session is current on any transport."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string"}
            },
            "required": ["session_id"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Session
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<SessionIdParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.sessions.delete(&params.session_id).await {
            Ok(()) => ToolResult::success(format!("Deleted session '{}'.", params.session_id)),
            Err(e) => e.into(),
        }
    }
}
