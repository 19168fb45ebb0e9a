//! Garden ledger node binary

use anyhow::Context;
use garden_ledger::server::{self, NodeState};
use garden_ledger::{Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match std::env::var("GARDEN_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("Failed to load config from environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting garden ledger node"
    );

    // Open ledger
    let ledger = Ledger::open(config)
        .await
        .context("Failed to open ledger")?;

    tracing::info!(
        plant_counter = ledger.plant_counter()?,
        plant_price = %ledger.plant_price(),
        rules = %serde_json::to_string(ledger.rules())?,
        "Ledger opened successfully"
    );

    // Serve health and metrics until SIGINT/SIGTERM
    let addr = ledger.config().metrics_listen_addr.clone();
    let state = NodeState::new(ledger.config(), ledger.metrics().clone());
    tracing::info!(addr = %addr, "Serving /health and /metrics");
    server::serve(state, &addr)
        .await
        .with_context(|| format!("HTTP server on {} failed", addr))?;

    tracing::info!("Shutting down garden ledger node");
    ledger.shutdown().await?;

    Ok(())
}
