//! # Capacity Ledger
//!
//! Per-worker, per-tier byte accounting with a cluster-wide aggregate.
//!
//! ## Invariants
//!
//! - `0 <= used <= total` for every (worker, tier) pair.
//! - The aggregate equals the sum over all *counted* (active) workers, and is
//!   updated in the same critical section as the per-worker change, so a
//!   reader never observes half of a registration.
//!
//! Callers serialize adjustments for one worker by holding that worker's
//! registry lock; the ledger's own locks are only held for the duration of a
//! single call.

use super::errors::{BlockMasterError, TierAlias, WorkerId};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Total and used bytes of one tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierCapacity {
    /// Tier size in bytes.
    pub total: u64,
    /// Bytes in use.
    pub used: u64,
}

impl TierCapacity {
    /// Bytes still free on this tier.
    pub fn available(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }
}

/// One tier as reported by a registering worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierReport {
    /// Tier alias.
    pub alias: TierAlias,
    /// Tier size in bytes.
    pub total: u64,
    /// Bytes in use as seen by the worker.
    pub used: u64,
}

/// Point-in-time view of one worker's tiers, in tier order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerUsage {
    /// Tier aliases, highest tier first.
    pub tier_order: Vec<TierAlias>,
    /// Total bytes per tier.
    pub totals: BTreeMap<TierAlias, u64>,
    /// Used bytes per tier.
    pub used: BTreeMap<TierAlias, u64>,
}

impl WorkerUsage {
    /// Sum of tier totals.
    pub fn capacity_bytes(&self) -> u64 {
        self.totals.values().fold(0, |acc, v| acc.saturating_add(*v))
    }

    /// Sum of tier used bytes.
    pub fn used_bytes(&self) -> u64 {
        self.used.values().fold(0, |acc, v| acc.saturating_add(*v))
    }
}

/// Cluster-wide totals over active workers. Both sums saturate at `u64::MAX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClusterCapacity {
    /// Sum of all tier totals.
    pub capacity_bytes: u64,
    /// Sum of all tier used bytes.
    pub used_bytes: u64,
}

impl ClusterCapacity {
    fn replace(&mut self, before: (u64, u64), after: (u64, u64)) {
        debug_assert!(self.capacity_bytes >= before.0, "aggregate capacity underflow");
        debug_assert!(self.used_bytes >= before.1, "aggregate used underflow");
        self.capacity_bytes = self
            .capacity_bytes
            .saturating_sub(before.0)
            .saturating_add(after.0);
        self.used_bytes = self.used_bytes.saturating_sub(before.1).saturating_add(after.1);
    }
}

#[derive(Debug, Default)]
struct WorkerLedger {
    tier_order: Vec<TierAlias>,
    tiers: HashMap<TierAlias, TierCapacity>,
    counted: bool,
}

impl WorkerLedger {
    fn sums(&self) -> (u64, u64) {
        self.tiers.values().fold((0, 0), |(total, used), t| {
            (total.saturating_add(t.total), used.saturating_add(t.used))
        })
    }

    fn contribution(&self) -> (u64, u64) {
        if self.counted {
            self.sums()
        } else {
            (0, 0)
        }
    }
}

/// Per-tier, per-worker byte accounting.
#[derive(Debug, Default)]
pub struct CapacityLedger {
    workers: DashMap<WorkerId, WorkerLedger>,
    cluster: RwLock<ClusterCapacity>,
}

impl CapacityLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a worker's tier table (registration / re-registration).
    ///
    /// Totals may grow or shrink. A reported used value above its total is
    /// clamped to the total.
    pub fn set_tiers(&self, worker_id: WorkerId, tiers: Vec<TierReport>) {
        let mut entry = self.workers.entry(worker_id).or_default();
        let before = entry.contribution();

        entry.tier_order.clear();
        entry.tiers.clear();
        for report in tiers {
            let used = if report.used > report.total {
                warn!(
                    worker_id,
                    tier = %report.alias,
                    used = report.used,
                    total = report.total,
                    "Reported used bytes exceed tier total, clamping"
                );
                report.total
            } else {
                report.used
            };
            if !entry.tiers.contains_key(&report.alias) {
                entry.tier_order.push(report.alias.clone());
            }
            entry.tiers.insert(
                report.alias,
                TierCapacity {
                    total: report.total,
                    used,
                },
            );
        }

        if entry
            .tiers
            .values()
            .try_fold(0u64, |acc, t| acc.checked_add(t.total))
            .is_none()
        {
            warn!(worker_id, "Reported tier totals overflow, capacity saturates");
        }

        let after = entry.contribution();
        self.cluster.write().replace(before, after);
    }

    /// Overwrite used bytes from a heartbeat report.
    ///
    /// Heartbeat values are authoritative. Tiers the worker never registered
    /// are ignored; values above the tier total are clamped.
    pub fn set_used(&self, worker_id: WorkerId, used_on_tiers: &HashMap<TierAlias, u64>) {
        let Some(mut entry) = self.workers.get_mut(&worker_id) else {
            warn!(worker_id, "Used bytes reported for worker without tiers");
            return;
        };
        let before = entry.contribution();

        for (alias, &used) in used_on_tiers {
            match entry.tiers.get_mut(alias) {
                Some(tier) => {
                    if used > tier.total {
                        warn!(
                            worker_id,
                            tier = %alias,
                            used,
                            total = tier.total,
                            "Heartbeat used bytes exceed tier total, clamping"
                        );
                    }
                    tier.used = used.min(tier.total);
                }
                None => warn!(worker_id, tier = %alias, "Heartbeat reports unknown tier, ignoring"),
            }
        }

        let after = entry.contribution();
        self.cluster.write().replace(before, after);
    }

    /// Apply a signed adjustment to a tier's used bytes.
    ///
    /// Fails with `CapacityExceeded` (leaving the ledger untouched) if the
    /// result would be negative or above the tier total. Returns the new used
    /// value.
    pub fn adjust_used(
        &self,
        worker_id: WorkerId,
        tier: &str,
        delta: i64,
    ) -> Result<u64, BlockMasterError> {
        let exceeded = |used: u64, total: u64| BlockMasterError::CapacityExceeded {
            worker_id,
            tier: tier.to_string(),
            used,
            total,
            delta,
        };

        let mut entry = self
            .workers
            .get_mut(&worker_id)
            .ok_or_else(|| exceeded(0, 0))?;
        let counted = entry.counted;
        let capacity = entry.tiers.get_mut(tier).ok_or_else(|| exceeded(0, 0))?;

        let new_used = if delta >= 0 {
            capacity.used.checked_add(delta as u64)
        } else {
            capacity.used.checked_sub(delta.unsigned_abs())
        };
        let new_used = match new_used {
            Some(v) if v <= capacity.total => v,
            _ => return Err(exceeded(capacity.used, capacity.total)),
        };

        let old_used = capacity.used;
        capacity.used = new_used;
        if counted {
            let mut cluster = self.cluster.write();
            cluster.replace((0, old_used), (0, new_used));
        }

        debug!(worker_id, tier, delta, used = new_used, "Adjusted used bytes");
        Ok(new_used)
    }

    /// Charge `bytes` to a tier.
    ///
    /// Like [`adjust_used`](Self::adjust_used) with a positive delta. A
    /// charge that does not fit a signed delta fails with `CapacityExceeded`.
    pub fn charge(
        &self,
        worker_id: WorkerId,
        tier: &str,
        bytes: u64,
    ) -> Result<u64, BlockMasterError> {
        match i64::try_from(bytes) {
            Ok(delta) => self.adjust_used(worker_id, tier, delta),
            Err(_) => {
                let current = self.tier(worker_id, tier).unwrap_or_default();
                Err(BlockMasterError::CapacityExceeded {
                    worker_id,
                    tier: tier.to_string(),
                    used: current.used,
                    total: current.total,
                    delta: i64::MAX,
                })
            }
        }
    }

    /// Give back `bytes` previously charged to a tier, saturating at zero.
    ///
    /// Used by compensation paths: a heartbeat may already have overwritten
    /// the value the charge was added to. Returns the bytes actually released.
    pub fn release_used(&self, worker_id: WorkerId, tier: &str, bytes: u64) -> u64 {
        let Some(mut entry) = self.workers.get_mut(&worker_id) else {
            return 0;
        };
        let counted = entry.counted;
        let Some(capacity) = entry.tiers.get_mut(tier) else {
            return 0;
        };

        let released = bytes.min(capacity.used);
        let old_used = capacity.used;
        capacity.used -= released;
        if counted {
            self.cluster
                .write()
                .replace((0, old_used), (0, capacity.used));
        }
        released
    }

    /// Start counting a worker in the cluster aggregate (worker became active).
    pub fn activate(&self, worker_id: WorkerId) {
        self.set_counted(worker_id, true);
    }

    /// Stop counting a worker in the cluster aggregate (worker lost).
    pub fn deactivate(&self, worker_id: WorkerId) {
        self.set_counted(worker_id, false);
    }

    fn set_counted(&self, worker_id: WorkerId, counted: bool) {
        let mut entry = self.workers.entry(worker_id).or_default();
        if entry.counted == counted {
            return;
        }
        let before = entry.contribution();
        entry.counted = counted;
        let after = entry.contribution();
        self.cluster.write().replace(before, after);
    }

    /// Highest tier of a worker (first in its registered order).
    pub fn top_tier(&self, worker_id: WorkerId) -> Option<TierAlias> {
        self.workers
            .get(&worker_id)
            .and_then(|e| e.tier_order.first().cloned())
    }

    /// Snapshot of one tier.
    pub fn tier(&self, worker_id: WorkerId, tier: &str) -> Option<TierCapacity> {
        self.workers
            .get(&worker_id)
            .and_then(|e| e.tiers.get(tier).copied())
    }

    /// Snapshot of all tiers of a worker.
    pub fn worker_usage(&self, worker_id: WorkerId) -> WorkerUsage {
        let Some(entry) = self.workers.get(&worker_id) else {
            return WorkerUsage::default();
        };
        WorkerUsage {
            tier_order: entry.tier_order.clone(),
            totals: entry
                .tiers
                .iter()
                .map(|(alias, t)| (alias.clone(), t.total))
                .collect(),
            used: entry
                .tiers
                .iter()
                .map(|(alias, t)| (alias.clone(), t.used))
                .collect(),
        }
    }

    /// Consistent snapshot of the cluster aggregate.
    pub fn aggregate(&self) -> ClusterCapacity {
        *self.cluster.read()
    }

    /// Total bytes over all tiers of all active workers.
    pub fn aggregate_capacity(&self) -> u64 {
        self.cluster.read().capacity_bytes
    }

    /// Used bytes over all tiers of all active workers.
    pub fn aggregate_used(&self) -> u64 {
        self.cluster.read().used_bytes
    }
}
