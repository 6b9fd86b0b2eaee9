//! # Block Master
//!
//! Entry point for the block master process.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`BM_LOG_LEVEL`, `BM_JSON_LOGS`)
//! 2. Load and validate timeouts (`BM_*_MS`)
//! 3. Build the service and start the sweeps
//! 4. Run until Ctrl-C, then stop the sweeps

use anyhow::{Context, Result};
use block_master::BlockMasterConfig;
use master_runtime::{init_logging, LogConfig, MasterRuntime};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LogConfig::from_env()).context("Failed to initialize logging")?;

    info!("===========================================");
    info!("  Block Master v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let config = BlockMasterConfig::from_env();
    let mut runtime = MasterRuntime::new(config).context("Invalid block master configuration")?;
    runtime.start();

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
