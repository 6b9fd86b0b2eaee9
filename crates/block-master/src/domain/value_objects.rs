//! # Domain Value Objects
//!
//! Immutable value types shared by the registries and the RPC surface.

use super::errors::{BlockId, TierAlias, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Milliseconds since the Unix epoch.
///
/// Only produced by a `TimeSource`, which keeps every timeout path
/// deterministic under test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from milliseconds since the epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the underlying milliseconds value.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Network address of a worker.
///
/// The master keys worker identity on the full address, so two workers on the
/// same host with different ports are different workers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerNetAddress {
    /// Hostname or IP.
    pub host: String,
    /// Port of the worker's RPC service.
    pub rpc_port: u16,
    /// Port of the worker's data service.
    pub data_port: u16,
}

impl WorkerNetAddress {
    /// Create a new worker address.
    pub fn new(host: impl Into<String>, rpc_port: u16, data_port: u16) -> Self {
        Self {
            host: host.into(),
            rpc_port,
            data_port,
        }
    }
}

impl fmt::Display for WorkerNetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.rpc_port, self.data_port)
    }
}

/// Worker lifecycle state machine.
///
/// ```text
/// Registering ──register──→ Active ──timeout──→ Lost
///                             ↑                   │
///                             └─register/heartbeat┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WorkerState {
    /// ID assigned, registration not yet received.
    #[default]
    Registering,
    /// Registered and heartbeating within the timeout.
    Active,
    /// Heartbeat timeout exceeded. Retained for history.
    Lost,
}

impl WorkerState {
    /// Check if transition to next state is valid.
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        match (self, next) {
            (Self::Registering, Self::Active) => true,
            (Self::Active, Self::Active) => true, // re-registration
            (Self::Active, Self::Lost) => true,
            (Self::Lost, Self::Active) => true,
            _ => false,
        }
    }

    /// Whether the worker's capacity counts towards cluster aggregates.
    pub fn is_counted(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Registering => write!(f, "REGISTERING"),
            WorkerState::Active => write!(f, "ACTIVE"),
            WorkerState::Lost => write!(f, "LOST"),
        }
    }
}

/// Command returned to a worker in response to a heartbeat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkerCommand {
    /// Keep heartbeating.
    #[default]
    Nothing,
    /// Send a full registration (block report) again.
    Register,
}

/// Where a block lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    /// Hosting worker.
    pub worker_id: WorkerId,
    /// Hosting worker's address.
    pub address: WorkerNetAddress,
    /// Tier the block is stored on.
    pub tier_alias: TierAlias,
}

/// Block metadata as seen by clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block ID.
    pub block_id: BlockId,
    /// Committed length. `None` until some worker commits the block.
    pub length: Option<u64>,
    /// Current locations, sorted by worker ID.
    pub locations: Vec<BlockLocation>,
}

/// Worker summary as seen by clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Worker ID.
    pub id: WorkerId,
    /// Worker address.
    pub address: WorkerNetAddress,
    /// Lifecycle state.
    pub state: WorkerState,
    /// Last registration or heartbeat.
    pub last_heartbeat: Timestamp,
    /// Sum of tier totals.
    pub capacity_bytes: u64,
    /// Sum of tier used bytes.
    pub used_bytes: u64,
    /// Total bytes per tier.
    pub capacity_bytes_on_tiers: BTreeMap<TierAlias, u64>,
    /// Used bytes per tier.
    pub used_bytes_on_tiers: BTreeMap<TierAlias, u64>,
    /// Number of blocks the worker hosts.
    pub block_count: usize,
}
