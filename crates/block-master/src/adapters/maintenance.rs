//! Background sweeps on tokio intervals.
//!
//! Each sweep runs in its own task and exits when the shutdown channel flips
//! to `true` or its sender is dropped.

use crate::service::BlockMasterService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Join handles of the maintenance tasks.
#[derive(Debug)]
pub struct MaintenanceHandles {
    /// Lost-worker detection.
    pub lost_worker_check: JoinHandle<()>,
    /// Expired cache reservation reclamation.
    pub cache_grant_sweep: JoinHandle<()>,
}

impl MaintenanceHandles {
    /// Wait for both tasks to finish.
    pub async fn join(self) {
        let _ = self.lost_worker_check.await;
        let _ = self.cache_grant_sweep.await;
    }
}

/// Spawn both sweeps with the periods from the service configuration.
///
/// Must be called from within a tokio runtime.
pub fn spawn_maintenance(
    service: Arc<BlockMasterService>,
    shutdown: watch::Receiver<bool>,
) -> MaintenanceHandles {
    let config = service.config().clone();

    let lost_worker_check = {
        let service = Arc::clone(&service);
        tokio::spawn(run_periodic(
            "lost_worker_check",
            config.lost_worker_check_interval,
            shutdown.clone(),
            move || {
                let lost = service.mark_workers_lost();
                if !lost.is_empty() {
                    info!(count = lost.len(), workers = ?lost, "Marked workers lost");
                }
            },
        ))
    };

    let cache_grant_sweep = tokio::spawn(run_periodic(
        "cache_grant_sweep",
        config.cache_grant_sweep_interval,
        shutdown,
        move || {
            service.reclaim_expired_grants();
        },
    ));

    MaintenanceHandles {
        lost_worker_check,
        cache_grant_sweep,
    }
}

async fn run_periodic<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut sweep: F,
) where
    F: FnMut() + Send + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(task = name, period_ms = period.as_millis() as u64, "Maintenance task started");

    loop {
        tokio::select! {
            _ = ticker.tick() => sweep(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!(task = name, "Maintenance task stopped");
}
