//! Silica core — the agent orchestration engine for an autonomous RTL
//! design pipeline.
//!
//! ## The loop
//! - `AgentLoop` — ReAct iteration: stream the model, dispatch tools,
//!   persist turns, stop on completion or bounds
//! - `LoopEvent` — the per-turn event vocabulary every transport consumes
//! - `ToolExecutor` — visibility, validation, session-bound dispatch
//!
//! ## Services
//! - `SessionManager` — lifecycle, per-transport cursors, history, usage
//! - `Workspace` — path-confined per-session filesystem view
//! - `JobSupervisor` — async synthesis runs with stuck detection
//! - `ToolRegistry` — one declaration per tool, exported to every transport
//! - `EventBus` — bounded fan-out of loop events to subscribers
//! - `McpServer` — the tool-protocol transport

pub mod agent;
pub mod ai;
pub mod bus;
pub mod config;
pub mod error;
pub mod mcp;
pub mod process;
pub mod prompt;
pub mod session;
pub mod spec;
pub mod storage;
pub mod synth;
pub mod tools;
pub mod verif;
pub mod workspace;

pub use agent::{AgentLoop, AgentServices, LoopEvent, ToolExecutor};
pub use bus::EventBus;
pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use session::SessionManager;
pub use synth::JobSupervisor;
pub use tools::ToolRegistry;
pub use workspace::Workspace;

use std::sync::Arc;

use ai::{HttpModelClient, ModelClient, ModelClientConfig};
use tools::registry::FilterMode;
use tools::implementations::register_all_tools;

/// Fully wired core: every service the transports need, built from one
/// config. The server and CLI both start here.
pub struct Core {
    pub config: Arc<CoreConfig>,
    pub sessions: Arc<SessionManager>,
    pub registry: Arc<ToolRegistry>,
    pub jobs: Arc<JobSupervisor>,
    pub bus: Arc<EventBus>,
    pub executor: Arc<ToolExecutor>,
    pub agent: Arc<AgentLoop>,
}

impl Core {
    /// Assemble the core with the given model client.
    pub async fn new(config: CoreConfig, model: Arc<dyn ModelClient>) -> Result<Self> {
        let config = Arc::new(config);
        std::fs::create_dir_all(config.workspace_root())?;

        let sessions = Arc::new(SessionManager::new(
            config.db_path(),
            config.workspace_root(),
        ));
        let default_filter = match config.default_filter {
            config::DefaultFilter::All => FilterMode::All,
            config::DefaultFilter::Essential => FilterMode::Essential,
        };
        let registry = Arc::new(ToolRegistry::new(default_filter));
        register_all_tools(&registry).await;

        let jobs = Arc::new(JobSupervisor::new(config.clone()));
        let bus = Arc::new(EventBus::new());
        let executor = Arc::new(ToolExecutor {
            registry: registry.clone(),
            sessions: sessions.clone(),
            jobs: jobs.clone(),
            bus: bus.clone(),
            config: config.clone(),
        });
        let agent = Arc::new(AgentLoop::new(AgentServices {
            model,
            executor: executor.clone(),
            sessions: sessions.clone(),
            bus: bus.clone(),
            config: config.clone(),
        }));

        Ok(Self {
            config,
            sessions,
            registry,
            jobs,
            bus,
            executor,
            agent,
        })
    }

    /// Assemble the core with the HTTP model client from the config.
    pub async fn from_config(config: CoreConfig) -> Result<Self> {
        let client = HttpModelClient::new(ModelClientConfig::new(
            &config.model,
            &config.llm_base_url,
            &config.llm_api_key,
        ));
        Self::new(config, Arc::new(client)).await
    }

    pub fn mcp_server(&self) -> mcp::McpServer {
        mcp::McpServer::new(
            self.executor.clone(),
            self.sessions.clone(),
            self.config.clone(),
        )
    }
}
