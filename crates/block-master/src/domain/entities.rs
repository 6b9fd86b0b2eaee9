//! # Domain Entities
//!
//! Mutable records owned by the registries.

use super::errors::{BlockId, TierAlias, WorkerId};
use super::value_objects::{Timestamp, WorkerNetAddress, WorkerState};
use std::collections::HashMap;
use tracing::info;

/// A storage worker as tracked by the master.
///
/// Always accessed through the registry's per-worker mutex. Holding that
/// mutex serializes every mutation of the worker's block set, its ledger
/// entries and the cache grants it owns.
#[derive(Clone, Debug)]
pub struct WorkerEntry {
    /// Master-assigned identity.
    pub id: WorkerId,
    /// Address the ID was assigned for. Never changes.
    pub address: WorkerNetAddress,
    /// Lifecycle state.
    pub state: WorkerState,
    /// Last registration or heartbeat (or assignment, before registration).
    pub last_heartbeat: Timestamp,
    /// Blocks this worker hosts, with the tier each lives on.
    pub blocks: HashMap<BlockId, TierAlias>,
}

impl WorkerEntry {
    /// Create a freshly assigned entry in the `Registering` state.
    pub fn new(id: WorkerId, address: WorkerNetAddress, now: Timestamp) -> Self {
        Self {
            id,
            address,
            state: WorkerState::Registering,
            last_heartbeat: now,
            blocks: HashMap::new(),
        }
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// Returns the previous state, or `None` if the transition was rejected.
    pub fn transition_to(&mut self, next: WorkerState) -> Option<WorkerState> {
        if !self.state.can_transition_to(next) {
            return None;
        }
        let previous = self.state;
        self.state = next;
        if previous != next {
            info!(
                worker_id = self.id,
                address = %self.address,
                from = %previous,
                to = %next,
                "Worker state changed"
            );
        }
        Some(previous)
    }

    /// Whether the heartbeat timeout has elapsed at `now`.
    pub fn is_stale(&self, now: Timestamp, timeout: std::time::Duration) -> bool {
        now.duration_since(self.last_heartbeat) > timeout
    }
}

/// Metadata of one block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockRecord {
    /// Length in bytes. `None` until the first commit.
    pub length: Option<u64>,
    /// Stored checksum digest, last write wins.
    pub checksum: Option<String>,
    /// Hosting workers and the tier each stores the block on.
    pub locations: HashMap<WorkerId, TierAlias>,
}

impl BlockRecord {
    /// A record nobody hosts and with nothing pinned can be dropped.
    pub fn is_orphaned(&self) -> bool {
        self.locations.is_empty() && self.checksum.is_none()
    }

    /// Whether some worker has committed this block.
    pub fn is_committed(&self) -> bool {
        self.length.is_some()
    }
}

/// An outstanding cache admission reservation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheGrant {
    /// Block to be cached.
    pub block_id: BlockId,
    /// Worker holding the reservation.
    pub worker_id: WorkerId,
    /// Tier the bytes were reserved on.
    pub tier: TierAlias,
    /// Reserved bytes (the block length).
    pub bytes: u64,
    /// When the reservation was made.
    pub granted_at: Timestamp,
}

impl CacheGrant {
    /// Whether the reservation is older than `timeout` at `now`.
    pub fn is_expired(&self, now: Timestamp, timeout: std::time::Duration) -> bool {
        now.duration_since(self.granted_at) > timeout
    }
}
