//! Domain Layer - in-memory registries with no I/O
//!
//! - Worker identities and lifecycle (`WorkerRegistry`)
//! - Block metadata and hosting sets (`BlockRegistry`)
//! - Per-tier byte accounting (`CapacityLedger`)
//! - Cache admission reservations (`CacheAdmissionController`)

pub mod block_registry;
pub mod cache_admission;
pub mod capacity;
pub mod entities;
pub mod errors;
pub mod value_objects;
pub mod worker_registry;

pub use block_registry::*;
pub use cache_admission::*;
pub use capacity::*;
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
pub use worker_registry::*;
