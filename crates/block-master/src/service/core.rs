use crate::config::BlockMasterConfig;
use crate::domain::{
    BlockRegistry, CacheAdmissionController, CacheAdmissionSnapshot, CapacityLedger, Timestamp,
    WorkerRegistry, WorkerState,
};
use crate::ports::TimeSource;
use std::sync::Arc;

/// Block master service implementing the worker and client ports.
///
/// Owns every registry. Two instances share nothing, so tests can run many
/// masters side by side.
///
/// # Example
///
/// ```rust,ignore
/// use block_master::{BlockMasterConfig, BlockMasterService, SystemTimeSource};
/// use block_master::ports::{BlockMasterWorkerApi, BlockMasterClientApi};
///
/// let service = BlockMasterService::new(
///     BlockMasterConfig::default(),
///     Arc::new(SystemTimeSource),
/// );
/// let id = service.get_worker_id(&WorkerNetAddress::new("worker-1", 29998, 29999));
/// assert_eq!(service.get_capacity_bytes(), 0);
/// ```
pub struct BlockMasterService {
    pub(crate) workers: WorkerRegistry,
    pub(crate) blocks: BlockRegistry,
    pub(crate) ledger: Arc<CapacityLedger>,
    pub(crate) cache: CacheAdmissionController,
    pub(crate) time_source: Arc<dyn TimeSource>,
    pub(crate) config: BlockMasterConfig,
}

impl BlockMasterService {
    /// Create an empty block master.
    pub fn new(config: BlockMasterConfig, time_source: Arc<dyn TimeSource>) -> Self {
        let ledger = Arc::new(CapacityLedger::new());
        Self {
            workers: WorkerRegistry::new(),
            blocks: BlockRegistry::new(),
            cache: CacheAdmissionController::new(Arc::clone(&ledger)),
            ledger,
            time_source,
            config,
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.time_source.now()
    }

    /// Active configuration.
    pub fn config(&self) -> &BlockMasterConfig {
        &self.config
    }

    /// Cache admission counters.
    pub fn cache_stats(&self) -> CacheAdmissionSnapshot {
        self.cache.stats().snapshot()
    }

    /// Number of cache reservations not yet released.
    pub fn outstanding_cache_grants(&self) -> usize {
        self.cache.outstanding()
    }

    /// Number of workers ever assigned an ID.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers currently in `state`.
    pub fn worker_count_in_state(&self, state: WorkerState) -> usize {
        self.workers.count_in_state(state)
    }

    /// Number of block records, including pinned records with no location.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
