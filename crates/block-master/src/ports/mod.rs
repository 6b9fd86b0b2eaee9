//! # Ports Layer
//!
//! ## Hexagonal Architecture
//!
//! - `inbound.rs` - Driving ports (worker and client APIs)
//! - `outbound.rs` - Driven ports (time source)

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
