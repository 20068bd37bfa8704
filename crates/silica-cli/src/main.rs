//! Silica — autonomous RTL design agent.
//!
//! Two ways in:
//! - `silica serve` — HTTP server: REST + SSE/WebSocket chat + MCP over HTTP
//! - `silica mcp`   — MCP server over stdio, for editor/desktop clients

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use silica_core::{Core, CoreConfig};

mod serve;

#[derive(Parser)]
#[command(name = "silica")]
#[command(about = "Autonomous RTL design agent: spec to synthesized layout", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (REST, chat streams, MCP over HTTP).
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },

    /// Run as an MCP server over stdio.
    ///
    /// Tools operate in the MCP transport's current session; one is created
    /// lazily on first use. Configure via SILICA_* environment variables.
    Mcp,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            init_tracing(false);
            serve::run(port).await
        }
        Commands::Mcp => {
            // stdio carries the protocol; logs must stay on stderr.
            init_tracing(true);
            let core = Arc::new(Core::from_config(CoreConfig::from_env()).await?);
            core.mcp_server().run_stdio().await?;
            Ok(())
        }
    }
}

fn init_tracing(stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "silica_core=info,silica_server=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if stderr {
        builder.with_writer(std::io::stderr).init();
    } else {
        builder.init();
    }
}
