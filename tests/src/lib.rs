//! # Block Master Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Criterion benchmarks (driven by benches/)
//! │   └── master.rs
//! │
//! └── integration/      # Cross-component flows
//!     ├── lifecycle.rs  # Worker lifecycle through the RPC handlers
//!     ├── client_flows.rs
//!     └── concurrency.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bm-tests
//! cargo test -p bm-tests integration::concurrency
//!
//! # Benchmarks
//! cargo bench -p bm-tests
//! ```

pub mod benchmarks;
pub mod integration;
