//! Agent core: the ReAct loop, tool dispatch and the event protocol.

pub mod executor;
pub mod loop_events;
pub mod orchestrator;
mod stream;

pub use executor::{ExecutedTool, ToolExecutor};
pub use loop_events::{LoopEvent, TurnUsage};
pub use orchestrator::{AgentLoop, AgentServices, STOPPED_MARKER};
