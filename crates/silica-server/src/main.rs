//! Standalone server binary: `silica-server [PORT]`.

use std::sync::Arc;

use silica_core::{Core, CoreConfig};
use silica_server::{start_server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "silica_core=info,silica_server=info".into()),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let core = Arc::new(Core::from_config(CoreConfig::from_env()).await?);
    start_server(core, ServerConfig { port }).await
}
