//! # Cache Admission
//!
//! Optimistic capacity reservations for blocks a worker is about to cache.
//!
//! A grant reserves the block length on the worker's top tier. It ends in one
//! of three ways, each of which gives the bytes back exactly once:
//!
//! 1. the worker reports the fill failed (`release_on_failure`),
//! 2. the worker commits the block (`take_for_commit`), after which the
//!    commit charges the bytes as usual,
//! 3. the grant outlives the timeout and is reclaimed by the sweep.
//!
//! Every method that touches a grant must be called while holding the
//! owning worker's registry lock.

use super::capacity::CapacityLedger;
use super::entities::CacheGrant;
use super::errors::{BlockId, WorkerId};
use super::value_objects::Timestamp;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Grants are keyed by block and the hostname that asked.
pub type GrantKey = (BlockId, String);

/// Counters for the admission protocol.
#[derive(Debug, Default)]
pub struct CacheAdmissionStats {
    /// Reservations made
    pub granted: AtomicU64,
    /// Requests denied (no room, no active worker, already hosted)
    pub denied: AtomicU64,
    /// Reservations released by a failure notification
    pub released_on_failure: AtomicU64,
    /// Reservations reclaimed by the expiry sweep
    pub reclaimed_by_sweep: AtomicU64,
    /// Reservations consumed by a commit of the same block
    pub converted_by_commit: AtomicU64,
}

/// Plain copy of [`CacheAdmissionStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheAdmissionSnapshot {
    pub granted: u64,
    pub denied: u64,
    pub released_on_failure: u64,
    pub reclaimed_by_sweep: u64,
    pub converted_by_commit: u64,
}

impl CacheAdmissionStats {
    /// Read all counters.
    pub fn snapshot(&self) -> CacheAdmissionSnapshot {
        CacheAdmissionSnapshot {
            granted: self.granted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            released_on_failure: self.released_on_failure.load(Ordering::Relaxed),
            reclaimed_by_sweep: self.reclaimed_by_sweep.load(Ordering::Relaxed),
            converted_by_commit: self.converted_by_commit.load(Ordering::Relaxed),
        }
    }
}

/// Grants and denies cache permissions against the capacity ledger.
#[derive(Debug)]
pub struct CacheAdmissionController {
    grants: DashMap<GrantKey, CacheGrant>,
    ledger: Arc<CapacityLedger>,
    stats: CacheAdmissionStats,
}

impl CacheAdmissionController {
    /// Create a controller reserving against `ledger`.
    pub fn new(ledger: Arc<CapacityLedger>) -> Self {
        Self {
            grants: DashMap::new(),
            ledger,
            stats: CacheAdmissionStats::default(),
        }
    }

    /// Reserve `length` bytes on `tier` of `worker_id` for `block_id`.
    ///
    /// An outstanding grant for the same key is returned as granted without
    /// reserving again. Returns `false` without mutation if the tier has no
    /// room.
    pub fn reserve(
        &self,
        block_id: BlockId,
        host: &str,
        worker_id: WorkerId,
        tier: &str,
        length: u64,
        now: Timestamp,
    ) -> bool {
        // The key stays locked until the grant is stored.
        let slot = match self.grants.entry((block_id, host.to_string())) {
            Entry::Occupied(_) => {
                debug!(block_id, host, "Cache permission already granted");
                return true;
            }
            Entry::Vacant(slot) => slot,
        };

        match self.ledger.charge(worker_id, tier, length) {
            Ok(_) => {
                slot.insert(CacheGrant {
                    block_id,
                    worker_id,
                    tier: tier.to_string(),
                    bytes: length,
                    granted_at: now,
                });
                self.stats.granted.fetch_add(1, Ordering::Relaxed);
                debug!(block_id, host, worker_id, tier, length, "Cache permission granted");
                true
            }
            Err(e) => {
                self.record_denied();
                warn!(block_id, host, worker_id, error = %e, "Cache permission denied");
                false
            }
        }
    }

    /// Count a denial decided by the caller.
    pub fn record_denied(&self) {
        self.stats.denied.fetch_add(1, Ordering::Relaxed);
    }

    /// Worker owning the grant for (`block_id`, `host`).
    pub fn owner(&self, block_id: BlockId, host: &str) -> Option<WorkerId> {
        self.grants
            .get(&(block_id, host.to_string()))
            .map(|g| g.worker_id)
    }

    /// Copy of an outstanding grant.
    pub fn get(&self, block_id: BlockId, host: &str) -> Option<CacheGrant> {
        self.grants
            .get(&(block_id, host.to_string()))
            .map(|g| g.clone())
    }

    /// Reverse the grant for (`block_id`, `host`) after a failed fill.
    ///
    /// No-op if there is no grant. Returns the bytes actually released.
    pub fn release_on_failure(&self, block_id: BlockId, host: &str) -> Option<u64> {
        let (_, grant) = self.grants.remove(&(block_id, host.to_string()))?;
        let released = self
            .ledger
            .release_used(grant.worker_id, &grant.tier, grant.bytes);
        self.stats.released_on_failure.fetch_add(1, Ordering::Relaxed);
        debug!(
            block_id,
            host,
            worker_id = grant.worker_id,
            released,
            "Released cache reservation after failure"
        );
        Some(released)
    }

    /// Remove and release the grant `worker_id` holds for `block_id`, ahead
    /// of that worker committing the block.
    ///
    /// Returns the grant and the bytes actually released, so the caller can
    /// [`restore`](Self::restore) it if the commit fails.
    pub fn take_for_commit(
        &self,
        block_id: BlockId,
        host: &str,
        worker_id: WorkerId,
    ) -> Option<(CacheGrant, u64)> {
        let (_, grant) = self
            .grants
            .remove_if(&(block_id, host.to_string()), |_, g| g.worker_id == worker_id)?;
        let released = self
            .ledger
            .release_used(grant.worker_id, &grant.tier, grant.bytes);
        Some((grant, released))
    }

    /// Count a grant consumed by a successful commit.
    pub fn confirm_conversion(&self, grant: &CacheGrant) {
        self.stats.converted_by_commit.fetch_add(1, Ordering::Relaxed);
        debug!(
            block_id = grant.block_id,
            worker_id = grant.worker_id,
            "Cache reservation converted by commit"
        );
    }

    /// Put back a grant taken by [`take_for_commit`](Self::take_for_commit).
    pub fn restore(&self, host: &str, grant: CacheGrant, released: u64) {
        if let Err(e) = self.ledger.charge(grant.worker_id, &grant.tier, released) {
            warn!(
                block_id = grant.block_id,
                worker_id = grant.worker_id,
                error = %e,
                "Could not restore cache reservation"
            );
            return;
        }
        self.grants.insert((grant.block_id, host.to_string()), grant);
    }

    /// Keys and owners of grants older than `timeout`.
    pub fn expired(&self, now: Timestamp, timeout: Duration) -> Vec<(GrantKey, WorkerId)> {
        self.grants
            .iter()
            .filter(|g| g.is_expired(now, timeout))
            .map(|g| (g.key().clone(), g.worker_id))
            .collect()
    }

    /// Release and delete one grant if it is still expired.
    ///
    /// Returns the bytes released, `None` if the grant is gone or was
    /// replaced by a fresh one in the meantime.
    pub fn reclaim(&self, key: &GrantKey, now: Timestamp, timeout: Duration) -> Option<u64> {
        let (_, grant) = self.grants.remove_if(key, |_, g| g.is_expired(now, timeout))?;
        let released = self
            .ledger
            .release_used(grant.worker_id, &grant.tier, grant.bytes);
        self.stats.reclaimed_by_sweep.fetch_add(1, Ordering::Relaxed);
        warn!(
            block_id = grant.block_id,
            host = %key.1,
            worker_id = grant.worker_id,
            age_ms = now.duration_since(grant.granted_at).as_millis() as u64,
            released,
            "Reclaimed expired cache reservation"
        );
        Some(released)
    }

    /// Number of outstanding grants.
    pub fn outstanding(&self) -> usize {
        self.grants.len()
    }

    /// Counters.
    pub fn stats(&self) -> &CacheAdmissionStats {
        &self.stats
    }
}
