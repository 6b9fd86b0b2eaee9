//! # Driven Ports (Outbound SPI)
//!
//! What the block master needs from its host.

use crate::domain::Timestamp;

/// Abstract interface for getting the current time.
///
/// Every timeout decision (lost workers, expired cache grants) reads the
/// clock through this trait, so tests can drive time by hand.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;
}
