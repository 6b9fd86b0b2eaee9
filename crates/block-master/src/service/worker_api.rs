//! Worker-facing operations.
//!
//! Every mutating path takes the worker's lock first and keeps it for the
//! whole call. Block entries, grants and ledger entries are then touched one
//! at a time underneath it.

use super::core::BlockMasterService;
use crate::domain::{
    BlockId, BlockMasterError, TierAlias, TierReport, WorkerCommand, WorkerId, WorkerNetAddress,
    WorkerState,
};
use crate::ports::{BlockMasterWorkerApi, CommitBlockRequest, HeartbeatRequest, RegisterWorkerRequest};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Build the ordered tier table of a registration.
///
/// Tiers follow `tier_aliases`; tiers that only appear in the totals are
/// appended in name order. Used bytes for tiers outside the table are
/// dropped.
fn tier_reports(request: &RegisterWorkerRequest) -> Vec<TierReport> {
    let mut order: Vec<TierAlias> = Vec::with_capacity(request.tier_aliases.len());
    for alias in &request.tier_aliases {
        if !order.contains(alias) {
            order.push(alias.clone());
        }
    }
    let extra: BTreeSet<&TierAlias> = request
        .total_bytes_on_tiers
        .keys()
        .filter(|alias| !order.contains(alias))
        .collect();
    order.extend(extra.into_iter().cloned());

    for alias in request.used_bytes_on_tiers.keys() {
        if !order.contains(alias) {
            warn!(
                worker_id = request.worker_id,
                tier = %alias,
                "Registration reports used bytes for unknown tier, ignoring"
            );
        }
    }

    order
        .into_iter()
        .map(|alias| TierReport {
            total: request.total_bytes_on_tiers.get(&alias).copied().unwrap_or(0),
            used: request.used_bytes_on_tiers.get(&alias).copied().unwrap_or(0),
            alias,
        })
        .collect()
}

impl BlockMasterWorkerApi for BlockMasterService {
    fn get_worker_id(&self, address: &WorkerNetAddress) -> WorkerId {
        self.workers.assign_id(address, self.now())
    }

    fn register_worker(&self, request: RegisterWorkerRequest) -> Result<(), BlockMasterError> {
        let worker_id = request.worker_id;
        let handle = self
            .workers
            .get(worker_id)
            .ok_or(BlockMasterError::UnknownWorker(worker_id))?;
        let now = self.now();
        let mut worker = handle.lock();

        self.ledger.set_tiers(worker_id, tier_reports(&request));

        let reported: HashMap<BlockId, TierAlias> = request
            .blocks_on_tiers
            .iter()
            .flat_map(|(tier, ids)| ids.iter().map(move |id| (*id, tier.clone())))
            .collect();
        let dropped: Vec<BlockId> = worker
            .blocks
            .keys()
            .filter(|id| !reported.contains_key(id))
            .copied()
            .collect();

        for block_id in &dropped {
            self.blocks.remove_location(*block_id, worker_id);
        }
        for (block_id, tier) in &reported {
            self.blocks.add_location(*block_id, worker_id, tier);
        }
        let block_count = reported.len();
        worker.blocks = reported;
        worker.last_heartbeat = now;

        if let Some(previous) = worker.transition_to(WorkerState::Active) {
            if !previous.is_counted() {
                self.ledger.activate(worker_id);
            }
        }

        info!(
            worker_id,
            address = %worker.address,
            tiers = request.tier_aliases.len(),
            blocks = block_count,
            dropped = dropped.len(),
            "Worker registered"
        );
        Ok(())
    }

    fn heartbeat(&self, request: HeartbeatRequest) -> Result<WorkerCommand, BlockMasterError> {
        let worker_id = request.worker_id;
        let handle = self
            .workers
            .get(worker_id)
            .ok_or(BlockMasterError::UnknownWorker(worker_id))?;
        let now = self.now();
        let mut worker = handle.lock();

        if worker.state == WorkerState::Registering {
            return Err(BlockMasterError::UnknownWorker(worker_id));
        }

        self.ledger.set_used(worker_id, &request.used_bytes_on_tiers);

        let mut added = 0usize;
        for (tier, ids) in &request.added_blocks_on_tiers {
            for block_id in ids {
                worker.blocks.insert(*block_id, tier.clone());
                self.blocks.add_location(*block_id, worker_id, tier);
                added += 1;
            }
        }
        for block_id in &request.removed_block_ids {
            worker.blocks.remove(block_id);
            self.blocks.remove_location(*block_id, worker_id);
        }
        worker.last_heartbeat = now;

        let command = if worker.state == WorkerState::Lost {
            worker.transition_to(WorkerState::Active);
            self.ledger.activate(worker_id);
            info!(worker_id, "Lost worker heartbeat received, requesting re-registration");
            WorkerCommand::Register
        } else {
            WorkerCommand::Nothing
        };

        debug!(
            worker_id,
            added,
            removed = request.removed_block_ids.len(),
            ?command,
            "Heartbeat applied"
        );
        Ok(command)
    }

    fn commit_block(&self, request: CommitBlockRequest) -> Result<(), BlockMasterError> {
        let CommitBlockRequest {
            worker_id,
            tier_alias,
            block_id,
            length,
        } = request;
        let handle = self
            .workers
            .get(worker_id)
            .ok_or(BlockMasterError::WorkerNotActive(worker_id))?;
        let mut worker = handle.lock();

        if worker.state != WorkerState::Active {
            return Err(BlockMasterError::WorkerNotActive(worker_id));
        }

        let host = worker.address.host.clone();
        let grant = self.cache.take_for_commit(block_id, &host, worker_id);
        let previous_tier = worker.blocks.get(&block_id).cloned();

        let result = self
            .blocks
            .commit(block_id, worker_id, &tier_alias, length, || {
                match previous_tier.as_deref() {
                    Some(tier) if tier == tier_alias => Ok(()),
                    _ => self
                        .ledger
                        .charge(worker_id, &tier_alias, length)
                        .map(|_| ()),
                }
            });

        match result {
            Ok(outcome) => {
                if let Some(old_tier) = previous_tier.filter(|t| *t != tier_alias) {
                    self.ledger.release_used(worker_id, &old_tier, length);
                    debug!(worker_id, block_id, from = %old_tier, to = %tier_alias, "Block moved tier");
                }
                worker.blocks.insert(block_id, tier_alias.clone());
                if let Some((grant, _)) = grant {
                    self.cache.confirm_conversion(&grant);
                }
                debug!(
                    worker_id,
                    block_id,
                    tier = %tier_alias,
                    length,
                    first_commit = outcome.length_recorded,
                    "Block committed"
                );
                Ok(())
            }
            Err(e) => {
                if let Some((grant, released)) = grant {
                    self.cache.restore(&host, grant, released);
                }
                Err(e)
            }
        }
    }

    fn request_cache_permission(
        &self,
        block_id: BlockId,
        host: &str,
    ) -> Result<bool, BlockMasterError> {
        let length = self
            .blocks
            .length(block_id)
            .ok_or(BlockMasterError::BlockNotFound(block_id))?;

        let Some((worker_id, handle)) = self
            .workers
            .find_active_by_host(host)
            .and_then(|id| self.workers.get(id).map(|h| (id, h)))
        else {
            self.cache.record_denied();
            warn!(block_id, host, "Cache permission denied: no active worker on host");
            return Ok(false);
        };

        let now = self.now();
        let worker = handle.lock();
        if worker.state != WorkerState::Active {
            self.cache.record_denied();
            warn!(block_id, host, worker_id, "Cache permission denied: worker not active");
            return Ok(false);
        }
        if worker.blocks.contains_key(&block_id) {
            self.cache.record_denied();
            debug!(block_id, host, worker_id, "Cache permission denied: block already hosted");
            return Ok(false);
        }
        let Some(tier) = self.ledger.top_tier(worker_id) else {
            self.cache.record_denied();
            warn!(block_id, host, worker_id, "Cache permission denied: worker has no tiers");
            return Ok(false);
        };

        Ok(self
            .cache
            .reserve(block_id, host, worker_id, &tier, length, now))
    }

    fn cache_failed_decrease(&self, block_id: BlockId, host: &str) {
        let Some(handle) = self
            .cache
            .owner(block_id, host)
            .and_then(|owner| self.workers.get(owner))
        else {
            debug!(block_id, host, "No cache reservation to release");
            return;
        };

        let _worker = handle.lock();
        self.cache.release_on_failure(block_id, host);
    }
}
