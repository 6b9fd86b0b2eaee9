//! # Block Master Runtime
//!
//! Wires the block master together for a process:
//!
//! 1. Load [`BlockMasterConfig`] and [`LogConfig`] from the environment
//! 2. Build the [`BlockMasterService`] on the system clock
//! 3. Expose the worker and client handlers to the embedding transport
//! 4. Run the lost-worker and cache-grant sweeps until shutdown

pub mod logging;

pub use logging::{init_logging, LogConfig, LoggingError};

use block_master::{
    spawn_maintenance, BlockMasterClientHandler, BlockMasterConfig, BlockMasterService,
    BlockMasterWorkerHandler, ConfigError, MaintenanceHandles, SystemTimeSource, TimeSource,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Running block master: service, handlers and background sweeps.
pub struct MasterRuntime {
    service: Arc<BlockMasterService>,
    worker_handler: BlockMasterWorkerHandler<BlockMasterService>,
    client_handler: BlockMasterClientHandler<BlockMasterService>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    maintenance: Option<MaintenanceHandles>,
}

impl MasterRuntime {
    /// Build a runtime on the system clock.
    pub fn new(config: BlockMasterConfig) -> Result<Self, ConfigError> {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Build a runtime on a custom clock.
    pub fn with_time_source(
        config: BlockMasterConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            worker_timeout_ms = config.worker_timeout.as_millis() as u64,
            lost_worker_check_interval_ms = config.lost_worker_check_interval.as_millis() as u64,
            cache_grant_timeout_ms = config.cache_grant_timeout.as_millis() as u64,
            cache_grant_sweep_interval_ms = config.cache_grant_sweep_interval.as_millis() as u64,
            "Block master configured"
        );

        let service = Arc::new(BlockMasterService::new(config, time_source));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            worker_handler: BlockMasterWorkerHandler::new(Arc::clone(&service)),
            client_handler: BlockMasterClientHandler::new(Arc::clone(&service)),
            service,
            shutdown_tx,
            maintenance: None,
        })
    }

    /// Start the background sweeps. Calling twice is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.maintenance.is_some() {
            warn!("Maintenance already running");
            return;
        }
        self.maintenance = Some(spawn_maintenance(
            Arc::clone(&self.service),
            self.shutdown_tx.subscribe(),
        ));
        info!("Block master started");
    }

    /// Service shared by the handlers.
    pub fn service(&self) -> &Arc<BlockMasterService> {
        &self.service
    }

    /// Handler for worker calls.
    pub fn worker_handler(&self) -> BlockMasterWorkerHandler<BlockMasterService> {
        self.worker_handler.clone()
    }

    /// Handler for client calls.
    pub fn client_handler(&self) -> BlockMasterClientHandler<BlockMasterService> {
        self.client_handler.clone()
    }

    /// Whether the sweeps are running.
    pub fn is_running(&self) -> bool {
        self.maintenance.is_some()
    }

    /// Signal the sweeps to stop and wait for them.
    pub async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(true);
        if let Some(handles) = self.maintenance.take() {
            handles.join().await;
        }
        info!(
            workers = self.service.worker_count(),
            blocks = self.service.block_count(),
            "Shutdown complete"
        );
    }
}
