//! # BeanBlock Ledger Coordinator
//!
//! Entry point. Configuration comes from the environment; see
//! `NodeConfig::from_lookup` for the recognized variables.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{NodeConfig, NodeRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env()?;

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    config.validate()?;
    config.validate_for_production()?;
    info!(environment = ?config.environment, "Configuration loaded");

    let runtime = NodeRuntime::new(config)?;
    if let Err(e) = runtime.start().await {
        runtime.shutdown().await;
        return Err(e);
    }

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    Ok(())
}
