//! Test utilities for the block master.
//!
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use block_master::test_utils::ManualTimeSource;
//! use block_master::TimeSource;
//! use std::time::Duration;
//!
//! let clock = ManualTimeSource::new(1_000);
//! clock.advance(Duration::from_secs(2));
//! assert_eq!(clock.now().as_millis(), 3_000);
//! ```

use crate::config::BlockMasterConfig;
use crate::domain::{BlockId, TierAlias, Timestamp, WorkerNetAddress};
use crate::ports::{RegisterWorkerRequest, TimeSource};
use crate::service::BlockMasterService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    /// Create a clock at `millis` since the epoch.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Jump to `millis`.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Move forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// A service with test timeouts and a manual clock starting at 1s.
pub fn test_service() -> (BlockMasterService, ManualTimeSource) {
    let clock = ManualTimeSource::new(1_000);
    let service = BlockMasterService::new(BlockMasterConfig::for_testing(), Arc::new(clock.clone()));
    (service, clock)
}

/// Address `worker-{n}` with fixed ports.
pub fn worker_address(n: u16) -> WorkerNetAddress {
    WorkerNetAddress::new(format!("worker-{n}"), 29998, 29999)
}

/// Builder for registration requests.
#[derive(Debug, Clone)]
pub struct RegistrationBuilder {
    request: RegisterWorkerRequest,
}

impl RegistrationBuilder {
    /// Start a registration for `worker_id` with no tiers.
    pub fn new(worker_id: u64) -> Self {
        Self {
            request: RegisterWorkerRequest {
                worker_id,
                ..RegisterWorkerRequest::default()
            },
        }
    }

    /// Add a tier (appended to the tier order).
    pub fn tier(mut self, alias: &str, total: u64, used: u64) -> Self {
        let alias: TierAlias = alias.to_string();
        self.request.tier_aliases.push(alias.clone());
        self.request.total_bytes_on_tiers.insert(alias.clone(), total);
        self.request.used_bytes_on_tiers.insert(alias, used);
        self
    }

    /// Report blocks held on `alias`.
    pub fn blocks(mut self, alias: &str, ids: &[BlockId]) -> Self {
        self.request
            .blocks_on_tiers
            .entry(alias.to_string())
            .or_default()
            .extend_from_slice(ids);
        self
    }

    /// Finish.
    pub fn build(self) -> RegisterWorkerRequest {
        self.request
    }
}

/// Used-bytes map from pairs.
pub fn used_on(tiers: &[(&str, u64)]) -> HashMap<TierAlias, u64> {
    tiers.iter().map(|(t, b)| (t.to_string(), *b)).collect()
}
