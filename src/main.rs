//! telchatd - terminal chat daemon.

use anyhow::Context;
use telchat::Server;
use telchat::config::{Config, LogFormat, validate};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.server.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        journal = %config.journal.path,
        "Starting telchatd"
    );

    let server = Server::bind(&config).await?;
    server.start();

    let journal_failed = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Interrupt received");
            false
        }
        _ = server.journal().failed() => true,
    };

    let result = server.shutdown().await;
    if journal_failed {
        anyhow::bail!("journal writer failed, messages are no longer durable");
    }
    result.context("journal did not shut down cleanly")?;
    Ok(())
}
