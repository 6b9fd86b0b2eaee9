//! # RPC Layer
//!
//! Request/response payloads and handlers for the two block master services.
//! No transport is attached here; servers decode a request, call `handle` and
//! encode the result.

pub mod handler;
pub mod payloads;

pub use handler::{BlockMasterClientHandler, BlockMasterWorkerHandler};
pub use payloads::*;
