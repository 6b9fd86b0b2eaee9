//! # Block Registry
//!
//! One record per known block: length, checksum and hosting workers.
//!
//! Records live in a sharded map; every operation holds a single entry guard
//! for its duration and never more than one at a time.

use super::entities::BlockRecord;
use super::errors::{BlockId, BlockMasterError, TierAlias, WorkerId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Result of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Tier the worker previously hosted the block on, if any.
    pub previous_tier: Option<TierAlias>,
    /// Whether this commit set the block's length.
    pub length_recorded: bool,
}

/// Store of block metadata.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: DashMap<BlockId, BlockRecord>,
}

impl BlockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `worker_id` hosts `block_id` on `tier`.
    ///
    /// Creates a record of unknown length if the block is new. Returns the
    /// tier the worker previously hosted the block on.
    pub fn add_location(
        &self,
        block_id: BlockId,
        worker_id: WorkerId,
        tier: &str,
    ) -> Option<TierAlias> {
        self.blocks
            .entry(block_id)
            .or_default()
            .locations
            .insert(worker_id, tier.to_string())
    }

    /// Remove `worker_id` from the hosting set of `block_id`.
    ///
    /// Deletes the record once it is orphaned. Returns whether the worker was
    /// hosting the block.
    pub fn remove_location(&self, block_id: BlockId, worker_id: WorkerId) -> bool {
        let Entry::Occupied(mut entry) = self.blocks.entry(block_id) else {
            return false;
        };
        let removed = entry.get_mut().locations.remove(&worker_id).is_some();
        if entry.get().is_orphaned() {
            entry.remove();
            debug!(block_id, "Dropped block record with no locations");
        }
        removed
    }

    /// Commit `block_id` with `length` on `worker_id`/`tier`.
    ///
    /// `charge` runs after the length check and before any mutation, while
    /// the block's entry is held. If either fails the record is left as it
    /// was (and not created if it did not exist).
    pub fn commit<F>(
        &self,
        block_id: BlockId,
        worker_id: WorkerId,
        tier: &str,
        length: u64,
        charge: F,
    ) -> Result<CommitOutcome, BlockMasterError>
    where
        F: FnOnce() -> Result<(), BlockMasterError>,
    {
        match self.blocks.entry(block_id) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if let Some(recorded) = record.length {
                    if recorded != length {
                        return Err(BlockMasterError::BlockLengthMismatch {
                            block_id,
                            recorded,
                            committed: length,
                        });
                    }
                }
                charge()?;
                let length_recorded = record.length.is_none();
                record.length = Some(length);
                let previous_tier = record.locations.insert(worker_id, tier.to_string());
                Ok(CommitOutcome {
                    previous_tier,
                    length_recorded,
                })
            }
            Entry::Vacant(slot) => {
                charge()?;
                let mut record = BlockRecord {
                    length: Some(length),
                    ..BlockRecord::default()
                };
                record.locations.insert(worker_id, tier.to_string());
                slot.insert(record);
                Ok(CommitOutcome {
                    previous_tier: None,
                    length_recorded: true,
                })
            }
        }
    }

    /// Committed length of a block, `None` if unknown or never committed.
    pub fn length(&self, block_id: BlockId) -> Option<u64> {
        self.blocks.get(&block_id).and_then(|r| r.length)
    }

    /// Copy of a block's record.
    pub fn get(&self, block_id: BlockId) -> Option<BlockRecord> {
        self.blocks.get(&block_id).map(|r| r.clone())
    }

    /// Length and hosting set of a block, sorted by worker ID.
    ///
    /// Fails with `BlockNotFound` if the record is absent or nobody hosts it.
    pub fn locations(
        &self,
        block_id: BlockId,
    ) -> Result<(Option<u64>, Vec<(WorkerId, TierAlias)>), BlockMasterError> {
        let record = self
            .blocks
            .get(&block_id)
            .ok_or(BlockMasterError::BlockNotFound(block_id))?;
        if record.locations.is_empty() {
            return Err(BlockMasterError::BlockNotFound(block_id));
        }
        let mut locations: Vec<_> = record
            .locations
            .iter()
            .map(|(worker, tier)| (*worker, tier.clone()))
            .collect();
        let length = record.length;
        drop(record);

        locations.sort_unstable_by_key(|(worker, _)| *worker);
        Ok((length, locations))
    }

    /// Store a checksum digest, last write wins.
    ///
    /// Fails with `BlockNotFound` unless some worker has committed the block.
    pub fn store_checksum(&self, block_id: BlockId, digest: &str) -> Result<(), BlockMasterError> {
        let mut record = self
            .blocks
            .get_mut(&block_id)
            .filter(|r| r.is_committed())
            .ok_or(BlockMasterError::BlockNotFound(block_id))?;
        record.checksum = Some(digest.to_string());
        Ok(())
    }

    /// Whether a stored digest exists and equals `digest` byte for byte.
    pub fn check_consistency(&self, block_id: BlockId, digest: &str) -> bool {
        self.blocks
            .get(&block_id)
            .and_then(|r| r.checksum.as_deref().map(|stored| stored == digest))
            .unwrap_or(false)
    }

    /// Number of records, pinned ones included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
