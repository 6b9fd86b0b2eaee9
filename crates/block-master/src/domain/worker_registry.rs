//! # Worker Registry
//!
//! One entry per worker ever assigned an ID. Entries are never deleted; lost
//! workers stay for history.
//!
//! Each entry sits behind its own mutex. Map guards are always released
//! before an entry mutex is taken, so holding a worker lock never blocks the
//! map for other workers.

use super::entities::WorkerEntry;
use super::errors::WorkerId;
use super::value_objects::{Timestamp, WorkerNetAddress, WorkerState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared handle to one worker entry.
pub type WorkerHandle = Arc<Mutex<WorkerEntry>>;

/// Registry of worker identities and lifecycle state.
#[derive(Debug)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerId, WorkerHandle>,
    by_address: DashMap<WorkerNetAddress, WorkerId>,
    by_host: DashMap<String, BTreeSet<WorkerId>>,
    next_id: AtomicU64,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    /// Create an empty registry. The first assigned ID is 1.
    pub fn new() -> Self {
        Self {
            workers: DashMap::new(),
            by_address: DashMap::new(),
            by_host: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Return the ID for `address`, allocating one if the address is new.
    ///
    /// Idempotent per address regardless of the worker's state. Concurrent
    /// calls for one address all observe the same ID because allocation
    /// happens while the address slot is exclusively held.
    pub fn assign_id(&self, address: &WorkerNetAddress, now: Timestamp) -> WorkerId {
        if let Some(id) = self.by_address.get(address) {
            return *id;
        }

        match self.by_address.entry(address.clone()) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.workers.insert(
                    id,
                    Arc::new(Mutex::new(WorkerEntry::new(id, address.clone(), now))),
                );
                self.by_host
                    .entry(address.host.clone())
                    .or_default()
                    .insert(id);
                slot.insert(id);
                debug!(worker_id = id, address = %address, "Assigned worker ID");
                id
            }
        }
    }

    /// Handle to a worker entry.
    pub fn get(&self, id: WorkerId) -> Option<WorkerHandle> {
        self.workers.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Lowest-ID active worker on `host`.
    pub fn find_active_by_host(&self, host: &str) -> Option<WorkerId> {
        let candidates: Vec<WorkerId> = self
            .by_host
            .get(host)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        candidates.into_iter().find(|id| {
            self.get(*id)
                .is_some_and(|handle| handle.lock().state == WorkerState::Active)
        })
    }

    /// All entries, sorted by ID.
    pub fn handles(&self) -> Vec<(WorkerId, WorkerHandle)> {
        let mut handles: Vec<_> = self
            .workers
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        handles.sort_unstable_by_key(|(id, _)| *id);
        handles
    }

    /// Number of known workers in any state.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker was ever assigned.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of workers currently in `state`.
    pub fn count_in_state(&self, state: WorkerState) -> usize {
        self.handles()
            .into_iter()
            .filter(|(_, handle)| handle.lock().state == state)
            .count()
    }
}
