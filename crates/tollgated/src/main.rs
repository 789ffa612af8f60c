//! tollgated — the Tollgate daemon.
//!
//! Assembles the controller and serves it:
//! - Config (`tollgate.toml`, optional)
//! - Guard publisher loop
//! - Promotion controller + policy gate
//! - REST API
//!
//! # Usage
//!
//! ```text
//! tollgated --config /etc/tollgate/tollgate.toml --port 8000
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use toll_core::TollgateConfig;
use tollgate_rollout::PromotionController;

#[derive(Parser)]
#[command(name = "tollgated", about = "Tollgate deployment-mode controller")]
struct Cli {
    /// Path to a TOML config file. Built-in defaults apply when omitted.
    #[arg(long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long, default_value = "8000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tollgated=debug,tollgate=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    serve(config, cli.port).await
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<TollgateConfig> {
    match path {
        Some(path) => {
            let config = TollgateConfig::from_file(path)?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => {
            info!("no config file given, using defaults");
            Ok(TollgateConfig::default())
        }
    }
}

async fn serve(config: TollgateConfig, port: u16) -> anyhow::Result<()> {
    info!("Tollgate daemon starting");

    let controller = PromotionController::from_config(&config);
    info!(
        enforce = config.policy.enforce,
        oci_min = config.guards.oci_min,
        "controller initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let guard = controller.guard().clone();
    let interval = Duration::from_secs(config.guards.publish_interval_secs);
    let publisher_handle = tokio::spawn(async move {
        guard.run(interval, shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = tollgate_api::build_router(controller);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = publisher_handle.await;

    info!("Tollgate daemon stopped");
    Ok(())
}
