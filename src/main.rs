mod abi;
mod balance;
mod bridge;
mod chain;
mod cli;
mod commands;
mod config;
mod error;
mod poller;
mod registry;
mod rpc;
mod signer;
#[cfg(test)]
mod testing;
mod types;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use tracing_subscriber::{fmt, EnvFilter};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = cli::Cli::parse();
    let config = config::Config::load(cli.config_path.as_deref())?;
    tracing::debug!(path = %config.path.display(), "config loaded");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling pending waits");
            trigger.cancel();
        }
    });

    cli.run(config, cancel).await
}
