//! Tool infrastructure: the `Tool` trait, execution context and result
//! envelope shared by every handler.

pub mod registry;
pub mod schema;
pub mod truncation;

pub mod implementations;

pub use registry::{FilterMode, ToolCategory, ToolRegistry};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::session::SessionManager;
use crate::synth::JobSupervisor;
use crate::workspace::Workspace;

/// Outcome of one tool invocation. The payload is text because the model
/// consumes text; structured data is rendered to YAML or a terse table by
/// the handler before it lands here.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
    /// Stable error code when `is_error`; mirrors `CoreError::code()`.
    pub code: Option<String>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
            code: None,
        }
    }

    pub fn error(code: &str, msg: impl std::fmt::Display) -> Self {
        Self {
            output: format!("error[{}]: {}", code, msg),
            is_error: true,
            code: Some(code.to_string()),
        }
    }

    pub fn from_core_error(err: &CoreError) -> Self {
        Self::error(err.code(), err)
    }
}

impl From<CoreError> for ToolResult {
    fn from(err: CoreError) -> Self {
        Self::from_core_error(&err)
    }
}

/// Parse tool parameters, converting deserialization failures into a
/// `BadArgs` tool result.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params)
        .map_err(|e| ToolResult::error("BadArgs", format!("invalid parameters: {}", e)))
}

/// Per-invocation context. Every tool runs against exactly one session; the
/// handle carries that session's workspace and the shared services, never a
/// process-global "current session".
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    /// Transport that initiated the turn ("web", "ws", "mcp", ...).
    pub transport: String,
    pub workspace: Workspace,
    pub sessions: Arc<SessionManager>,
    pub jobs: Arc<JobSupervisor>,
    pub registry: Arc<ToolRegistry>,
    pub config: Arc<CoreConfig>,
    pub cancel: CancellationToken,
    /// Per-call timeout override; the registry applies its default otherwise.
    pub timeout: Option<Duration>,
}

impl ToolContext {
    /// Record that a tool mutated session state.
    pub fn touch_session(&self) {
        if let Err(e) = self.sessions.touch(&self.session_id) {
            tracing::warn!(session_id = %self.session_id, "failed to touch session: {}", e);
        }
    }
}

/// A named, schema-typed operation the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the argument object. This single definition feeds the
    /// model tool binding, MCP `tools/list` and executor-side validation.
    fn parameters_schema(&self) -> Value;

    fn category(&self) -> ToolCategory {
        ToolCategory::Other
    }

    /// Hard timeout for this tool's execution; `None` uses the registry
    /// default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}
