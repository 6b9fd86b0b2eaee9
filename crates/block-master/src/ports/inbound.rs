//! # Inbound Ports (Driving Ports)
//!
//! The operations the block master exposes to its RPC layer. Workers drive
//! [`BlockMasterWorkerApi`]; readers and writers drive [`BlockMasterClientApi`].
//!
//! Every method is synchronous, in-memory and bounded. Calls may arrive
//! concurrently, out of order and more than once.

use crate::domain::{
    BlockId, BlockInfo, BlockMasterError, TierAlias, WorkerCommand, WorkerId, WorkerInfo,
    WorkerNetAddress,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Full registration report from a worker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    /// ID from a previous `get_worker_id`.
    pub worker_id: WorkerId,
    /// Tier aliases, highest tier first.
    pub tier_aliases: Vec<TierAlias>,
    /// Total bytes per tier.
    pub total_bytes_on_tiers: HashMap<TierAlias, u64>,
    /// Used bytes per tier.
    pub used_bytes_on_tiers: HashMap<TierAlias, u64>,
    /// Every block the worker holds, grouped by tier.
    pub blocks_on_tiers: HashMap<TierAlias, Vec<BlockId>>,
}

/// Periodic delta report from a worker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Reporting worker.
    pub worker_id: WorkerId,
    /// Used bytes per tier. Overwrites the master's values.
    pub used_bytes_on_tiers: HashMap<TierAlias, u64>,
    /// Blocks the worker no longer holds.
    pub removed_block_ids: Vec<BlockId>,
    /// Blocks the worker gained since the last report, grouped by tier.
    pub added_blocks_on_tiers: HashMap<TierAlias, Vec<BlockId>>,
}

/// A worker's declaration that it holds a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitBlockRequest {
    /// Committing worker.
    pub worker_id: WorkerId,
    /// Tier the block is stored on.
    pub tier_alias: TierAlias,
    /// Block being committed.
    pub block_id: BlockId,
    /// Block length in bytes.
    pub length: u64,
}

/// Operations called by storage workers.
pub trait BlockMasterWorkerApi {
    /// Return the ID for `address`, allocating one on first contact.
    ///
    /// Never fails. The same address always gets the same ID, including
    /// after the worker was marked lost.
    fn get_worker_id(&self, address: &WorkerNetAddress) -> WorkerId;

    /// Apply a full registration report and mark the worker active.
    ///
    /// Blocks previously hosted by this worker and missing from the report
    /// are removed from their hosting sets.
    ///
    /// ## Errors
    ///
    /// - `UnknownWorker`: the ID was never assigned
    fn register_worker(&self, request: RegisterWorkerRequest) -> Result<(), BlockMasterError>;

    /// Apply a heartbeat: used bytes, then added blocks, then removed blocks.
    ///
    /// Returns `Register` if the worker was lost and must send a full report.
    ///
    /// ## Errors
    ///
    /// - `UnknownWorker`: the ID was never assigned or never registered
    fn heartbeat(&self, request: HeartbeatRequest) -> Result<WorkerCommand, BlockMasterError>;

    /// Record that a worker holds a block and charge its length once.
    ///
    /// ## Errors
    ///
    /// - `WorkerNotActive`: the worker is not active
    /// - `BlockLengthMismatch`: an earlier commit recorded another length
    /// - `CapacityExceeded`: the tier has no room for the block
    fn commit_block(&self, request: CommitBlockRequest) -> Result<(), BlockMasterError>;

    /// Ask to reserve room on the worker at `host` for caching `block_id`.
    ///
    /// ## Errors
    ///
    /// - `BlockNotFound`: the block was never committed
    fn request_cache_permission(
        &self,
        block_id: BlockId,
        host: &str,
    ) -> Result<bool, BlockMasterError>;

    /// Give back a reservation after a failed cache fill. Idempotent.
    fn cache_failed_decrease(&self, block_id: BlockId, host: &str);
}

/// Operations called by clients.
pub trait BlockMasterClientApi {
    /// Length and locations of a block.
    ///
    /// ## Errors
    ///
    /// - `BlockNotFound`: unknown block, or no worker hosts it
    fn get_block_info(&self, block_id: BlockId) -> Result<BlockInfo, BlockMasterError>;

    /// Summaries of all known workers, sorted by ID.
    fn get_worker_info_list(&self) -> Vec<WorkerInfo>;

    /// Total bytes across all tiers of all active workers.
    fn get_capacity_bytes(&self) -> u64;

    /// Used bytes across all tiers of all active workers.
    fn get_used_bytes(&self) -> u64;

    /// Store a checksum digest for a committed block. Last write wins.
    ///
    /// ## Errors
    ///
    /// - `BlockNotFound`: the block was never committed
    fn store_checksum(&self, block_id: BlockId, digest: &str) -> Result<(), BlockMasterError>;

    /// Whether the stored digest equals `digest`. `false` if none is stored.
    fn check_consistency(&self, block_id: BlockId, digest: &str) -> bool;
}
