use super::core::BlockMasterService;
use crate::domain::{BlockId, BlockInfo, BlockLocation, BlockMasterError, WorkerInfo};
use crate::ports::BlockMasterClientApi;

impl BlockMasterClientApi for BlockMasterService {
    fn get_block_info(&self, block_id: BlockId) -> Result<BlockInfo, BlockMasterError> {
        // Hosting set is copied out before any worker lock is taken.
        let (length, hosts) = self.blocks.locations(block_id)?;

        let locations = hosts
            .into_iter()
            .filter_map(|(worker_id, tier_alias)| {
                let handle = self.workers.get(worker_id)?;
                let address = handle.lock().address.clone();
                Some(BlockLocation {
                    worker_id,
                    address,
                    tier_alias,
                })
            })
            .collect();

        Ok(BlockInfo {
            block_id,
            length,
            locations,
        })
    }

    fn get_worker_info_list(&self) -> Vec<WorkerInfo> {
        self.workers
            .handles()
            .into_iter()
            .map(|(id, handle)| {
                let worker = handle.lock();
                let usage = self.ledger.worker_usage(id);
                WorkerInfo {
                    id,
                    address: worker.address.clone(),
                    state: worker.state,
                    last_heartbeat: worker.last_heartbeat,
                    capacity_bytes: usage.capacity_bytes(),
                    used_bytes: usage.used_bytes(),
                    capacity_bytes_on_tiers: usage.totals,
                    used_bytes_on_tiers: usage.used,
                    block_count: worker.blocks.len(),
                }
            })
            .collect()
    }

    fn get_capacity_bytes(&self) -> u64 {
        self.ledger.aggregate_capacity()
    }

    fn get_used_bytes(&self) -> u64 {
        self.ledger.aggregate_used()
    }

    fn store_checksum(&self, block_id: BlockId, digest: &str) -> Result<(), BlockMasterError> {
        self.blocks.store_checksum(block_id, digest)
    }

    fn check_consistency(&self, block_id: BlockId, digest: &str) -> bool {
        self.blocks.check_consistency(block_id, digest)
    }
}
