//! # Domain Errors
//!
//! Recoverable error taxonomy of the block master.
//!
//! Every variant is returned to the caller as a typed failure. None of them is
//! fatal to the process: the RPC boundary translates them into wire errors and
//! the caller decides whether to retry or re-register.

use thiserror::Error;

/// Worker identifier, assigned by the master.
pub type WorkerId = u64;

/// Block identifier.
pub type BlockId = u64;

/// Storage tier alias (e.g. "MEM", "SSD", "HDD").
pub type TierAlias = String;

/// Block master error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockMasterError {
    /// The worker ID was never assigned, or is not in a state that accepts the call.
    #[error("Unknown worker: {0}")]
    UnknownWorker(WorkerId),

    /// The operation requires an active worker.
    #[error("Worker {0} is not active")]
    WorkerNotActive(WorkerId),

    /// No committed block with this ID is known (or it has no live location).
    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),

    /// A re-commit disagrees with the length recorded by an earlier commit.
    #[error("Block {block_id} length mismatch: recorded {recorded}, committed {committed}")]
    BlockLengthMismatch {
        /// Block being committed
        block_id: BlockId,
        /// Length from the first commit
        recorded: u64,
        /// Length in the rejected commit
        committed: u64,
    },

    /// The adjustment would take used bytes below zero or above the tier total.
    #[error("Capacity exceeded on worker {worker_id} tier {tier}: used {used}, total {total}, delta {delta}")]
    CapacityExceeded {
        /// Worker whose ledger was adjusted
        worker_id: WorkerId,
        /// Tier being adjusted
        tier: TierAlias,
        /// Used bytes before the adjustment
        used: u64,
        /// Tier total bytes
        total: u64,
        /// Requested signed adjustment
        delta: i64,
    },
}

impl BlockMasterError {
    /// Whether a worker receiving this error should re-register from scratch.
    pub fn requires_reregistration(&self) -> bool {
        matches!(self, Self::UnknownWorker(_) | Self::WorkerNotActive(_))
    }
}
