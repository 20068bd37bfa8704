//! Tool dispatch for the agent loop and external tool-protocol clients.
//!
//! Resolution order per invocation: visibility under the session's filter,
//! argument validation against the registry schema, session-bound dispatch.
//! Handler failures come back as error results for the model to read, never
//! as loop-fatal errors; the executor itself never retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::loop_events::LoopEvent;
use crate::ai::types::AiToolCall;
use crate::bus::EventBus;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::session::SessionManager;
use crate::synth::JobSupervisor;
use crate::tools::truncation::truncate_for_model;
use crate::tools::{schema, ToolContext, ToolRegistry, ToolResult};

/// One completed invocation with its accounting.
#[derive(Debug, Clone)]
pub struct ExecutedTool {
    pub result: ToolResult,
    pub duration: Duration,
    /// Bytes the handler produced before model-facing truncation.
    pub bytes: usize,
}

pub struct ToolExecutor {
    pub registry: Arc<ToolRegistry>,
    pub sessions: Arc<SessionManager>,
    pub jobs: Arc<JobSupervisor>,
    pub bus: Arc<EventBus>,
    pub config: Arc<CoreConfig>,
}

impl ToolExecutor {
    pub async fn execute(
        &self,
        session_id: &str,
        transport: &str,
        call: &AiToolCall,
        cancel: CancellationToken,
    ) -> ExecutedTool {
        let start = Instant::now();

        self.bus
            .publish(
                session_id,
                LoopEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                },
            )
            .await;

        let result = self
            .resolve_and_run(session_id, transport, call, cancel)
            .await;
        let duration = start.elapsed();
        let bytes = result.output.len();

        let truncated = ToolResult {
            output: truncate_for_model(&result.output),
            ..result
        };

        self.bus
            .publish(
                session_id,
                LoopEvent::ToolResult {
                    id: call.id.clone(),
                    status: if truncated.is_error { "error" } else { "success" }.to_string(),
                    content: truncated.output.clone(),
                    duration_ms: duration.as_millis() as u64,
                    bytes,
                },
            )
            .await;

        tracing::debug!(
            tool = %call.name,
            session_id,
            is_error = truncated.is_error,
            duration_ms = duration.as_millis() as u64,
            bytes,
            "tool executed"
        );

        ExecutedTool {
            result: truncated,
            duration,
            bytes,
        }
    }

    async fn resolve_and_run(
        &self,
        session_id: &str,
        transport: &str,
        call: &AiToolCall,
        cancel: CancellationToken,
    ) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name).await else {
            return ToolResult::error("NotFound", format!("unknown tool '{}'", call.name));
        };

        if !self.registry.is_visible(session_id, &call.name).await {
            return ToolResult::from_core_error(&CoreError::ToolNotVisible(call.name.clone()));
        }

        let problems = schema::validate_args(&tool.parameters_schema(), &call.arguments);
        if !problems.is_empty() {
            return ToolResult::error("BadArgs", problems.join("; "));
        }

        let ctx = ToolContext {
            session_id: session_id.to_string(),
            transport: transport.to_string(),
            workspace: self.sessions.workspace(session_id),
            sessions: self.sessions.clone(),
            jobs: self.jobs.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            cancel,
            timeout: None,
        };

        self.registry
            .execute(&call.name, call.arguments.clone(), &ctx)
            .await
            .unwrap_or_else(|| {
                ToolResult::error("NotFound", format!("unknown tool '{}'", call.name))
            })
    }
}
