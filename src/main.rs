//! Line chat server - Entry Point
//!
//! Resolves configuration, binds the listener and runs the ChatServer until
//! Ctrl+C, then shuts every session down gracefully.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use line_chat::{ChatServer, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .init();

    let config = Cli::parse()
        .into_config()
        .context("failed to load configuration")?;

    // A bind failure aborts the process
    let server = ChatServer::bind(&config)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    let addr = server.local_addr()?;
    info!("Chat server listening on {}", addr);

    server.run_until_ctrl_c().await?;
    Ok(())
}
