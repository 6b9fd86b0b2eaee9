//! # Adapters
//!
//! - `time.rs` - wall-clock `TimeSource`
//! - `maintenance.rs` - tokio tasks driving the periodic sweeps

pub mod maintenance;
pub mod time;

pub use maintenance::{spawn_maintenance, MaintenanceHandles};
pub use time::SystemTimeSource;
