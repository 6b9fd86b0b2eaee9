//! # Integration Tests
//!
//! Flows that cross the handler, service, client and runtime boundaries.

pub mod concurrency;
pub mod lifecycle;
