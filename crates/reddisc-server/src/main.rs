//! RedDisc monitoring daemon
//!
//! Streams new Reddit comments for the union of subreddits the tenants
//! subscribe to, and posts a notification to a tenant's Discord channel when
//! a watched user comments in one of its subreddits. Edits to the tenant file
//! (through `reddisc-admin` or by hand) are picked up on the next idle cycle.
//!
//! Usage:
//! ```bash
//! # With config file
//! reddisc --config reddisc.yaml
//!
//! # Or with environment variables
//! REDDISC_DISCORD_TOKEN=... REDDISC_TENANTS=./tenants.yaml reddisc
//! ```

mod bootstrap;
mod config;

use clap::Parser;
use config::ServerConfig;
use reddisc_observability::init_logging;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// RedDisc - Reddit comment notifications for Discord
#[derive(Parser)]
#[command(name = "reddisc")]
#[command(version, about = "Reddit to Discord comment notification daemon", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", env = "REDDISC_CONFIG")]
    config: Option<String>,

    /// Check the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    // Merge environment variables (they override config file)
    config.merge_env();
    config.validate()?;

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    match &cli.config {
        Some(path) => info!("📁 Loaded configuration from: {}", path),
        None => info!("📁 Using default configuration"),
    }

    if cli.check {
        info!("✅ Configuration is valid");
        return Ok(());
    }

    let daemon = bootstrap::build(&config).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    info!("✅ RedDisc {} started", env!("CARGO_PKG_VERSION"));
    let stats = bootstrap::run(daemon, cancel).await?;

    info!(
        "RedDisc stopped: {} comments processed, {} notifications delivered, {} failed",
        stats.events, stats.deliveries, stats.delivery_failures
    );
    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
