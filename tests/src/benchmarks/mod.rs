//! # Block Master Benchmarks
//!
//! Benchmark bodies shared with `benches/master_benchmarks.rs`.

pub mod master;
