//! RPC payload definitions for the worker and client services.
//!
//! Transport-agnostic: every payload derives serde, framing is up to the
//! embedding server.

use crate::domain::{
    BlockId, BlockInfo, BlockMasterError, WorkerCommand, WorkerId, WorkerInfo, WorkerNetAddress,
};
use crate::ports::{CommitBlockRequest, HeartbeatRequest, RegisterWorkerRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version reported by the worker service.
pub const BLOCK_MASTER_WORKER_SERVICE_VERSION: u32 = 2;

/// Version reported by the client service.
pub const BLOCK_MASTER_CLIENT_SERVICE_VERSION: u32 = 2;

// ============================================================
// ERRORS
// ============================================================

/// Wire error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The referenced worker or block does not exist.
    NotFound,
    /// The request conflicts with recorded state.
    FailedPrecondition,
    /// Not enough capacity.
    ResourceExhausted,
    /// Temporarily unable to serve; retrying may succeed.
    Unavailable,
    /// Anything else.
    Internal,
}

impl ErrorCode {
    /// Whether a caller may retry the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Error returned across the RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct RpcError {
    /// Category.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl RpcError {
    /// Create an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<BlockMasterError> for RpcError {
    fn from(err: BlockMasterError) -> Self {
        let code = match &err {
            BlockMasterError::UnknownWorker(_) | BlockMasterError::BlockNotFound(_) => {
                ErrorCode::NotFound
            }
            BlockMasterError::WorkerNotActive(_) => ErrorCode::Unavailable,
            BlockMasterError::BlockLengthMismatch { .. } => ErrorCode::FailedPrecondition,
            BlockMasterError::CapacityExceeded { .. } => ErrorCode::ResourceExhausted,
        };
        Self::new(code, err.to_string())
    }
}

// ============================================================
// WORKER SERVICE
// ============================================================

/// Calls made by workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerRequest {
    /// Report the service version.
    GetServiceVersion,
    /// Get (or allocate) the ID for an address.
    GetWorkerId {
        /// Worker's address
        address: WorkerNetAddress,
    },
    /// Full registration.
    RegisterWorker(RegisterWorkerRequest),
    /// Periodic delta report.
    Heartbeat(HeartbeatRequest),
    /// Declare a block held.
    CommitBlock(CommitBlockRequest),
    /// Ask to reserve room for caching a block.
    GetCachePermission {
        /// Block to cache
        block_id: BlockId,
        /// Hostname of the caching worker
        host: String,
    },
    /// Release a reservation after a failed fill.
    CacheFailedDecrease {
        /// Block that failed to cache
        block_id: BlockId,
        /// Hostname of the caching worker
        host: String,
    },
}

impl WorkerRequest {
    /// Method name for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetServiceVersion => "GetServiceVersion",
            Self::GetWorkerId { .. } => "GetWorkerId",
            Self::RegisterWorker(_) => "RegisterWorker",
            Self::Heartbeat(_) => "Heartbeat",
            Self::CommitBlock(_) => "CommitBlock",
            Self::GetCachePermission { .. } => "GetCachePermission",
            Self::CacheFailedDecrease { .. } => "CacheFailedDecrease",
        }
    }
}

/// Successful replies to [`WorkerRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerResponse {
    /// Service version.
    ServiceVersion(u32),
    /// Assigned worker ID.
    WorkerId(WorkerId),
    /// Registration applied.
    Registered,
    /// Heartbeat applied.
    Command(WorkerCommand),
    /// Commit applied.
    Committed,
    /// Whether the reservation was granted.
    CachePermission(bool),
    /// Reservation released (or there was none).
    CacheReleased,
}

// ============================================================
// CLIENT SERVICE
// ============================================================

/// Calls made by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Report the service version.
    GetServiceVersion,
    /// List all workers.
    GetWorkerInfoList,
    /// Cluster capacity.
    GetCapacityBytes,
    /// Cluster used bytes.
    GetUsedBytes,
    /// Locate a block.
    GetBlockInfo {
        /// Block to look up
        block_id: BlockId,
    },
    /// Store a checksum digest.
    StoreChecksum {
        /// Committed block
        block_id: BlockId,
        /// Digest to store
        digest: String,
    },
    /// Compare a digest against the stored one.
    CheckConsistency {
        /// Block to check
        block_id: BlockId,
        /// Digest to compare
        digest: String,
    },
}

impl ClientRequest {
    /// Method name for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetServiceVersion => "GetServiceVersion",
            Self::GetWorkerInfoList => "GetWorkerInfoList",
            Self::GetCapacityBytes => "GetCapacityBytes",
            Self::GetUsedBytes => "GetUsedBytes",
            Self::GetBlockInfo { .. } => "GetBlockInfo",
            Self::StoreChecksum { .. } => "StoreChecksum",
            Self::CheckConsistency { .. } => "CheckConsistency",
        }
    }
}

/// Successful replies to [`ClientRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientResponse {
    /// Service version.
    ServiceVersion(u32),
    /// All workers, sorted by ID.
    WorkerInfoList(Vec<WorkerInfo>),
    /// Cluster capacity in bytes.
    CapacityBytes(u64),
    /// Cluster used bytes.
    UsedBytes(u64),
    /// Block length and locations.
    BlockInfo(BlockInfo),
    /// Checksum stored.
    ChecksumStored,
    /// Whether the digests match.
    Consistency(bool),
}
