//! The ReAct agent loop.
//!
//! One `run_turn` call processes one user message to completion: compose the
//! conversation, stream the model, dispatch tool calls, persist history, and
//! repeat until the model stops requesting tools or a bound fires. Turns
//! within a session are serialized by the session manager's lock; everything
//! the loop persists commits per iteration, so a crash replays at most the
//! in-flight iteration.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::executor::ToolExecutor;
use super::loop_events::{LoopEvent, TurnUsage};
use super::stream::consume_stream;
use crate::ai::types::{estimate_tokens, Content, ModelMessage, Role, Usage};
use crate::ai::ModelClient;
use crate::bus::EventBus;
use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::prompt::SYSTEM_PROMPT;
use crate::session::SessionManager;

/// Marker appended to a cancelled turn's assistant text.
pub const STOPPED_MARKER: &str = "[Stopped]";

pub struct AgentServices {
    pub model: Arc<dyn ModelClient>,
    pub executor: Arc<ToolExecutor>,
    pub sessions: Arc<SessionManager>,
    pub bus: Arc<EventBus>,
    pub config: Arc<CoreConfig>,
}

pub struct AgentLoop {
    services: AgentServices,
}

impl AgentLoop {
    pub fn new(services: AgentServices) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &AgentServices {
        &self.services
    }

    /// Process one user message for a session over a transport.
    ///
    /// Emits the loop event vocabulary on the bus and returns once `turn.done`
    /// or `turn.error` has been published. Fatal conditions also surface as
    /// the returned error so callers can map them to transport codes.
    pub async fn run_turn(
        &self,
        session_id: &str,
        transport: &str,
        user_message: String,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.services.sessions.open(session_id)?;

        // Serialize turns per session; concurrent callers queue here.
        let lock = self.services.sessions.turn_lock(session_id).await;
        let _guard = lock.lock().await;

        // The turn token fires on caller cancellation or budget expiry.
        let turn_cancel = cancel.child_token();
        let budget_watchdog = {
            let token = turn_cancel.clone();
            let budget = self.services.config.turn_budget;
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                tracing::warn!("turn budget expired, cancelling");
                token.cancel();
            })
        };

        let result = self
            .turn_inner(session_id, transport, user_message, &turn_cancel)
            .await;

        budget_watchdog.abort();

        if let Err(err) = &result {
            self.services
                .bus
                .publish(session_id, LoopEvent::error(err.code(), err.to_string()))
                .await;
        }

        result
    }

    async fn turn_inner(
        &self,
        session_id: &str,
        transport: &str,
        user_message: String,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let AgentServices {
            model,
            executor,
            sessions,
            bus,
            config,
        } = &self.services;

        let mut conversation = sessions.history(session_id)?;
        let user_turn = ModelMessage::user_text(user_message);
        sessions.append_turns(session_id, std::slice::from_ref(&user_turn), Usage::default())?;
        conversation.push(user_turn);

        bus.publish(
            session_id,
            LoopEvent::TurnStart {
                session_id: session_id.to_string(),
            },
        )
        .await;

        let mut turn_usage = Usage::default();

        for _iteration in 1..=config.max_iterations {
            let tools = executor.registry.visible_tools(session_id).await;
            let rx = model
                .stream_chat(SYSTEM_PROMPT, &conversation, &tools)
                .await?;

            let outcome = consume_stream(rx, bus, session_id, cancel).await;

            let iteration_usage = outcome.usage.unwrap_or_else(|| Usage {
                input_tokens: estimate_tokens(
                    conversation.iter().map(ModelMessage::char_len).sum(),
                ),
                output_tokens: estimate_tokens(outcome.text.len()),
            });
            turn_usage.add(iteration_usage);

            if let Some(err) = outcome.error {
                return match err {
                    CoreError::Cancelled => {
                        self.persist_stopped(session_id, &outcome.text, iteration_usage)?;
                        Err(CoreError::Cancelled)
                    }
                    other => {
                        // Provider stream died; keep whatever the model said.
                        if !outcome.text.is_empty() {
                            self.persist_stopped(session_id, &outcome.text, iteration_usage)?;
                        }
                        Err(other)
                    }
                };
            }

            if outcome.tool_calls.is_empty() {
                // Terminal iteration: assistant turn only, then done.
                let assistant = assistant_message(&outcome.text, &[]);
                if !assistant.content.is_empty() {
                    sessions.append_turns(session_id, &[assistant], iteration_usage)?;
                } else {
                    sessions.record_usage(session_id, iteration_usage)?;
                }
                // Checkpoint the transport cursor; a failed write is fatal
                // to the turn.
                let checkpoint = serde_json::json!({
                    "turns": sessions.history(session_id)?.len(),
                    "usage": turn_usage,
                })
                .to_string();
                sessions.save_checkpoint(session_id, transport, &checkpoint)?;
                bus.publish(
                    session_id,
                    LoopEvent::TurnDone {
                        usage: TurnUsage {
                            input_tokens: turn_usage.input_tokens,
                            output_tokens: turn_usage.output_tokens,
                        },
                    },
                )
                .await;
                return Ok(());
            }

            // Tool iteration: execute every call in emission order, pair
            // each with exactly one result, persist both turns atomically.
            let assistant = assistant_message(&outcome.text, &outcome.tool_calls);
            let mut results = Vec::with_capacity(outcome.tool_calls.len());
            for call in &outcome.tool_calls {
                let done = executor
                    .execute(session_id, transport, call, cancel.clone())
                    .await;
                results.push(Content::ToolResult {
                    tool_use_id: call.id.clone(),
                    output: done.result.output,
                    is_error: done.result.is_error.then_some(true),
                });
            }
            let tool_turn = ModelMessage {
                role: Role::Tool,
                content: results,
            };

            sessions.append_turns(
                session_id,
                &[assistant.clone(), tool_turn.clone()],
                iteration_usage,
            )?;
            conversation.push(assistant);
            conversation.push(tool_turn);

            if cancel.is_cancelled() {
                self.persist_stopped(session_id, "", Usage::default())?;
                return Err(CoreError::Cancelled);
            }
        }

        Err(CoreError::StepBudgetExhausted(config.max_iterations))
    }

    /// Persist the partial assistant output of an aborted turn, marked.
    fn persist_stopped(&self, session_id: &str, text: &str, usage: Usage) -> Result<()> {
        let marked = if text.is_empty() {
            STOPPED_MARKER.to_string()
        } else {
            format!("{}\n\n{}", text, STOPPED_MARKER)
        };
        let assistant = ModelMessage {
            role: Role::Assistant,
            content: vec![Content::Text { text: marked }],
        };
        self.services
            .sessions
            .append_turns(session_id, &[assistant], usage)
    }
}

fn assistant_message(text: &str, tool_calls: &[crate::ai::types::AiToolCall]) -> ModelMessage {
    let mut content = Vec::with_capacity(tool_calls.len() + usize::from(!text.is_empty()));
    if !text.is_empty() {
        content.push(Content::Text {
            text: text.to_string(),
        });
    }
    for call in tool_calls {
        content.push(Content::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        });
    }
    ModelMessage {
        role: Role::Assistant,
        content,
    }
}
