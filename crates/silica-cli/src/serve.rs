//! `silica serve` — start the unified HTTP server.

use anyhow::Result;
use std::sync::Arc;

use silica_core::{Core, CoreConfig};
use silica_server::{start_server, ServerConfig};

pub async fn run(port: u16) -> Result<()> {
    let config = CoreConfig::from_env();
    if config.llm_api_key.is_empty() {
        tracing::warn!(
            "no model credential configured (SILICA_LLM_API_KEY / ANTHROPIC_API_KEY); \
             chat turns will fail until one is set"
        );
    }

    let core = Arc::new(Core::from_config(config).await?);
    start_server(core, ServerConfig { port }).await
}
