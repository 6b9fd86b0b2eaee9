//! Periodic sweeps.
//!
//! Both sweeps are plain synchronous calls; `adapters::maintenance` drives
//! them on tokio intervals.

use super::core::BlockMasterService;
use crate::domain::{Timestamp, WorkerId, WorkerState};
use std::time::Duration;
use tracing::{debug, warn};

impl BlockMasterService {
    /// Mark every active worker whose last heartbeat is older than the
    /// configured timeout as lost. Returns the IDs marked.
    pub fn mark_workers_lost(&self) -> Vec<WorkerId> {
        self.mark_workers_lost_at(self.now(), self.config.worker_timeout)
    }

    /// Mark every active worker whose last heartbeat is older than `timeout`
    /// at `now` as lost.
    ///
    /// Lost workers keep their hosting entries; only their capacity leaves
    /// the cluster aggregate.
    pub fn mark_workers_lost_at(&self, now: Timestamp, timeout: Duration) -> Vec<WorkerId> {
        let mut lost = Vec::new();
        for (worker_id, handle) in self.workers.handles() {
            let mut worker = handle.lock();
            if worker.state != WorkerState::Active || !worker.is_stale(now, timeout) {
                continue;
            }
            worker.transition_to(WorkerState::Lost);
            self.ledger.deactivate(worker_id);
            warn!(
                worker_id,
                address = %worker.address,
                silent_ms = now.duration_since(worker.last_heartbeat).as_millis() as u64,
                hosted_blocks = worker.blocks.len(),
                "Worker heartbeat timed out"
            );
            lost.push(worker_id);
        }
        lost
    }

    /// Reclaim cache reservations older than the configured timeout.
    /// Returns the number reclaimed.
    pub fn reclaim_expired_grants(&self) -> usize {
        self.reclaim_expired_grants_at(self.now(), self.config.cache_grant_timeout)
    }

    /// Reclaim cache reservations older than `timeout` at `now`.
    pub fn reclaim_expired_grants_at(&self, now: Timestamp, timeout: Duration) -> usize {
        let mut reclaimed = 0;
        for (key, owner) in self.cache.expired(now, timeout) {
            let Some(handle) = self.workers.get(owner) else {
                continue;
            };
            let _worker = handle.lock();
            if self.cache.reclaim(&key, now, timeout).is_some() {
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            debug!(reclaimed, "Cache reservation sweep finished");
        }
        reclaimed
    }
}
