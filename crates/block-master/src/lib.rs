//! # Block Master
//!
//! Authoritative metadata service of a tiered block store. Tracks which
//! workers exist, how much room each offers per storage tier, which blocks
//! each worker holds and whether a block's checksum is known.
//!
//! ## Architecture
//!
//! ```text
//!  workers ──WorkerRequest──→ BlockMasterWorkerHandler ─┐
//!                                                       ├─→ BlockMasterService
//!  clients ──ClientRequest──→ BlockMasterClientHandler ─┘        │
//!                                                                 ├─ WorkerRegistry
//!                                                                 ├─ BlockRegistry
//!                                                                 ├─ CapacityLedger
//!                                                                 └─ CacheAdmissionController
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Stable identity | One worker ID per address, never reused |
//! | Bounded usage | `0 <= used <= total` for every worker tier |
//! | Immutable length | A committed block's length never changes |
//! | Charge once | A (worker, block) pair is charged on its first commit only |
//! | Release once | A cache reservation is given back exactly once |
//! | Consistent aggregate | Cluster totals cover active workers and never show half an update |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Registries, ledger and cache admission (no I/O)
//! - `ports/` - Inbound worker/client APIs, outbound `TimeSource`
//! - `service/` - `BlockMasterService` orchestrator and periodic sweeps
//! - `ipc/` - Request/response payloads and handlers
//! - `client/` - Retrying client
//! - `adapters/` - System clock and tokio maintenance tasks
//! - `config.rs` - Timeouts and sweep periods

pub mod adapters;
pub mod client;
pub mod config;
pub mod domain;
pub mod ipc;
pub mod ports;
pub mod service;

/// Test utilities (ManualTimeSource, fixtures)
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{spawn_maintenance, MaintenanceHandles, SystemTimeSource};
pub use client::{BlockMasterClient, ClientError, InProcessTransport, MasterTransport, RetryPolicy};
pub use config::{BlockMasterConfig, ConfigError};
pub use domain::{
    BlockId, BlockInfo, BlockLocation, BlockMasterError, CacheAdmissionSnapshot, TierAlias,
    Timestamp, WorkerCommand, WorkerId, WorkerInfo, WorkerNetAddress, WorkerState,
};
pub use ipc::{
    BlockMasterClientHandler, BlockMasterWorkerHandler, ClientRequest, ClientResponse, ErrorCode,
    RpcError, WorkerRequest, WorkerResponse, BLOCK_MASTER_CLIENT_SERVICE_VERSION,
    BLOCK_MASTER_WORKER_SERVICE_VERSION,
};
pub use ports::{
    BlockMasterClientApi, BlockMasterWorkerApi, CommitBlockRequest, HeartbeatRequest,
    RegisterWorkerRequest, TimeSource,
};
pub use service::BlockMasterService;
