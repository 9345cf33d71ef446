//! Pick-and-place controller binary.
//!
//! Wires the serial protocol engine, the vision bridge and the status
//! endpoint together and runs them until Ctrl-C.

mod app;
mod cli;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config().context("failed to load configuration")?;

    let snapshot = app::run(config, cli.mock_device, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    })
    .await?;

    tracing::info!(state = %snapshot.state, "Controller stopped");
    Ok(())
}
