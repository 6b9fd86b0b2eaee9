//! # Block Master Service
//!
//! Orchestrator implementing `BlockMasterWorkerApi` and `BlockMasterClientApi`
//! on top of the domain registries.
//!
//! ## Lock order
//!
//! ```text
//! worker mutex → block entry → ledger entry → cluster aggregate
//!             ↘ cache grant ↗
//! ```
//!
//! No call holds two block entries or two worker mutexes at once.

mod client_api;
mod core;
mod maintenance;
mod worker_api;

pub use self::core::BlockMasterService;
