//! Daemon wiring
//!
//! Assembles the tenant store, the Reddit source, the Discord sink and the
//! metrics into a `ReconciliationLoop`, and runs it next to the optional
//! metrics endpoint until the cancellation token fires.

use anyhow::Context;
use reddisc_config_file::FileConfigStore;
use reddisc_egress::{DiscordSink, RedditCommentSource};
use reddisc_observability::{HealthState, Metrics, health_router};
use reddisc_routing::{LoopStats, ReconciliationLoop};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Everything the daemon runs
pub struct Daemon {
    pub monitor: ReconciliationLoop,
    pub metrics: Metrics,
    pub metrics_addr: Option<SocketAddr>,
}

/// Build the daemon from a validated configuration
pub async fn build(config: &ServerConfig) -> anyhow::Result<Daemon> {
    let tenants_path = config.tenants_path()?;
    let store = FileConfigStore::open_or_create(&tenants_path)
        .await
        .with_context(|| format!("Failed to open tenant file {}", tenants_path.display()))?;
    info!("📁 Tenant file: {}", store.path().display());

    let source = RedditCommentSource::new(config.reddit_config())
        .context("Failed to create Reddit comment source")?;
    let sink =
        DiscordSink::new(config.discord_config()).context("Failed to create Discord sink")?;
    let metrics = Metrics::new().context("Failed to register metrics")?;

    let monitor = ReconciliationLoop::new(
        Arc::new(store),
        Box::new(source),
        Arc::new(sink),
        config.monitor_config(),
    )
    .with_metrics(metrics.clone());

    let metrics_addr = if config.metrics.enabled {
        Some(config.metrics_addr()?)
    } else {
        None
    };

    Ok(Daemon {
        monitor,
        metrics,
        metrics_addr,
    })
}

/// Run the monitor loop and the metrics endpoint until `cancel` fires.
///
/// The loop ending (cancelled or failed at startup) cancels the endpoint too.
pub async fn run(daemon: Daemon, cancel: CancellationToken) -> anyhow::Result<LoopStats> {
    let endpoint = match daemon.metrics_addr {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?;
            info!("   Observability:");
            info!("   - Health check:       http://{}/healthz", addr);
            info!("   - Readiness check:    http://{}/readyz", addr);
            info!("   - Prometheus metrics: http://{}/metrics", addr);

            let app = health_router(HealthState::new(Arc::new(daemon.metrics.clone())));
            let shutdown = cancel.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
            }))
        }
        None => None,
    };

    let result = daemon.monitor.run(cancel.clone()).await;
    cancel.cancel();

    if let Some(handle) = endpoint {
        match handle.await {
            Ok(Ok(())) => info!("Metrics endpoint stopped"),
            Ok(Err(e)) => warn!("Metrics endpoint error: {}", e),
            Err(e) => warn!("Metrics endpoint task failed: {}", e),
        }
    }

    result.context("Monitor loop failed to start")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.tenants_path = dir.path().join("tenants.yaml").display().to_string();
        config.discord.bot_token = "token".to_string();
        config
    }

    #[tokio::test]
    async fn test_build_creates_tenant_file() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let daemon = build(&config).await.unwrap();

        assert!(dir.path().join("tenants.yaml").exists());
        assert!(daemon.metrics_addr.is_none());
    }

    #[tokio::test]
    async fn test_build_with_metrics_endpoint() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.metrics.enabled = true;
        config.metrics.listen = "127.0.0.1:0".to_string();

        let daemon = build(&config).await.unwrap();
        assert_eq!(daemon.metrics_addr.map(|a| a.port()), Some(0));
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_cancelled() {
        let dir = TempDir::new().unwrap();
        let daemon = build(&config(&dir)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = run(daemon, cancel).await.unwrap();
        assert_eq!(stats, LoopStats::default());
    }
}
