//! # Concurrency Stress
//!
//! Many threads hitting one service at once. After the storm the
//! accounting must still add up:
//!
//! - every tier stays within `0..=total`
//! - a worker is charged exactly once per committed block
//! - cluster totals equal the sum over active workers, and readers never
//!   observe half an update

/// Fixed length per block so every commit of a block agrees.
pub fn block_length(block_id: u64) -> u64 {
    1_000 + (block_id % 7) * 10
}

#[cfg(test)]
mod tests {
    use super::block_length;
    use block_master::test_utils::{
        test_service, used_on, worker_address, ManualTimeSource, RegistrationBuilder,
    };
    use block_master::{
        BlockMasterClientApi, BlockMasterService, BlockMasterWorkerApi, CommitBlockRequest,
        HeartbeatRequest, Timestamp, WorkerId, WorkerInfo, WorkerState,
    };
    use proptest::prelude::*;
    use rand::Rng;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const WORKERS: u16 = 8;
    const BLOCKS: u64 = 200;
    const MEM_TOTAL: u64 = 1_000_000;

    fn register_all(service: &BlockMasterService) -> Vec<WorkerId> {
        (1..=WORKERS)
            .map(|n| {
                let id = service.get_worker_id(&worker_address(n));
                service
                    .register_worker(RegistrationBuilder::new(id).tier("MEM", MEM_TOTAL, 0).build())
                    .unwrap();
                id
            })
            .collect()
    }

    fn commit(service: &BlockMasterService, worker_id: WorkerId, block_id: u64) {
        service
            .commit_block(CommitBlockRequest {
                worker_id,
                tier_alias: "MEM".to_string(),
                block_id,
                length: block_length(block_id),
            })
            .unwrap();
    }

    fn assert_tiers_bounded(workers: &[WorkerInfo]) {
        for worker in workers {
            for (tier, used) in &worker.used_bytes_on_tiers {
                let total = worker.capacity_bytes_on_tiers[tier];
                assert!(*used <= total, "worker {} tier {tier}: {used} > {total}", worker.id);
            }
        }
    }

    fn assert_aggregate_matches(service: &BlockMasterService) {
        let workers = service.get_worker_info_list();
        assert_tiers_bounded(&workers);
        let active = workers.iter().filter(|w| w.state == WorkerState::Active);
        let (capacity, used) = active.fold((0, 0), |(c, u), w| {
            (c + w.capacity_bytes, u + w.used_bytes)
        });
        assert_eq!(service.get_capacity_bytes(), capacity);
        assert_eq!(service.get_used_bytes(), used);
    }

    #[test]
    fn test_concurrent_commits_and_cache_churn_charge_once() {
        let (service, _) = test_service();
        let service = Arc::new(service);
        let ids = register_all(&service);

        // Worker i commits every block with id % WORKERS in {i, i+1}, twice.
        let mut expected: HashMap<WorkerId, u64> = HashMap::new();
        for (i, id) in ids.iter().enumerate() {
            let owned = (0..BLOCKS).filter(|b| {
                let slot = (b % WORKERS as u64) as usize;
                slot == i || slot == (i + 1) % WORKERS as usize
            });
            expected.insert(*id, owned.map(block_length).sum());
        }

        thread::scope(|scope| {
            for (i, &id) in ids.iter().enumerate() {
                let service = Arc::clone(&service);
                scope.spawn(move || {
                    for _ in 0..2 {
                        for block in 0..BLOCKS {
                            let slot = (block % WORKERS as u64) as usize;
                            if slot == i || slot == (i + 1) % WORKERS as usize {
                                commit(&service, id, block);
                            }
                        }
                    }
                });
            }

            for n in 1..=WORKERS {
                let service = Arc::clone(&service);
                scope.spawn(move || {
                    let host = worker_address(n).host;
                    let mut rng = rand::thread_rng();
                    for _ in 0..500 {
                        let block = rng.gen_range(0..BLOCKS);
                        // Blocks not committed yet answer NotFound.
                        if let Ok(true) = service.request_cache_permission(block, &host) {
                            if rng.gen_bool(0.5) {
                                service.cache_failed_decrease(block, &host);
                            }
                        }
                    }
                });
            }
        });

        // Leftover reservations are reclaimed by the sweep.
        let far_future = Timestamp::from_millis(u64::MAX / 2);
        service.reclaim_expired_grants_at(far_future, Duration::ZERO);
        assert_eq!(service.outstanding_cache_grants(), 0);

        let stats = service.cache_stats();
        assert_eq!(
            stats.granted,
            stats.released_on_failure + stats.reclaimed_by_sweep + stats.converted_by_commit
        );

        for worker in service.get_worker_info_list() {
            assert_eq!(worker.used_bytes, expected[&worker.id], "worker {}", worker.id);
        }
        assert_aggregate_matches(&service);
        assert_eq!(service.block_count(), BLOCKS as usize);
    }

    #[test]
    fn test_heartbeats_racing_loss_sweep_keep_aggregate_whole() {
        let (service, _) = test_service();
        let service = Arc::new(service);
        let ids = register_all(&service);
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            let heartbeats: Vec<_> = ids
                .iter()
                .map(|&id| {
                    let service = Arc::clone(&service);
                    scope.spawn(move || {
                        let mut rng = rand::thread_rng();
                        for _ in 0..1_000 {
                            let mem = rng.gen_range(0..=MEM_TOTAL);
                            let request = HeartbeatRequest {
                                worker_id: id,
                                used_bytes_on_tiers: used_on(&[("MEM", mem)]),
                                ..HeartbeatRequest::default()
                            };
                            service.heartbeat(request).unwrap();
                        }
                    })
                })
                .collect();

            {
                let service = Arc::clone(&service);
                let done = &done;
                scope.spawn(move || {
                    let far_future = Timestamp::from_millis(u64::MAX / 2);
                    while !done.load(Ordering::Relaxed) {
                        service.mark_workers_lost_at(far_future, Duration::from_secs(1));
                        thread::yield_now();
                    }
                });
            }

            // Capacity only ever moves in whole-worker steps.
            {
                let service = Arc::clone(&service);
                let done = &done;
                scope.spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        let capacity = service.get_capacity_bytes();
                        assert_eq!(capacity % MEM_TOTAL, 0);
                        assert!(capacity <= MEM_TOTAL * WORKERS as u64);
                        assert!(service.get_used_bytes() <= MEM_TOTAL * WORKERS as u64);
                    }
                });
            }

            for handle in heartbeats {
                handle.join().unwrap();
            }
            done.store(true, Ordering::Relaxed);
        });

        assert_aggregate_matches(&service);
    }

    #[test]
    fn test_concurrent_id_requests_agree() {
        let (service, _) = test_service();
        let service = Arc::new(service);

        let results: Vec<Vec<WorkerId>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let service = Arc::clone(&service);
                    scope.spawn(move || {
                        (1..=50u16)
                            .map(|n| service.get_worker_id(&worker_address(n)))
                            .collect()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
        let mut ids = results[0].clone();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 50);
        assert_eq!(service.worker_count(), 50);
    }

    // =============================================================================
    // Random operation sequences
    // =============================================================================

    #[derive(Debug, Clone)]
    enum Op {
        Commit { worker: usize, block: u64, ssd: bool },
        Evict { worker: usize, block: u64 },
        Report { worker: usize, mem: u64 },
        Cache { worker: usize, block: u64 },
        CacheFailed { worker: usize, block: u64 },
        Lose { worker: usize },
        Sweep,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3usize, 0..12u64, any::<bool>())
                .prop_map(|(worker, block, ssd)| Op::Commit { worker, block, ssd }),
            (0..3usize, 0..12u64).prop_map(|(worker, block)| Op::Evict { worker, block }),
            (0..3usize, 0..1_500u64).prop_map(|(worker, mem)| Op::Report { worker, mem }),
            (0..3usize, 0..12u64).prop_map(|(worker, block)| Op::Cache { worker, block }),
            (0..3usize, 0..12u64).prop_map(|(worker, block)| Op::CacheFailed { worker, block }),
            (0..3usize).prop_map(|worker| Op::Lose { worker }),
            Just(Op::Sweep),
        ]
    }

    fn apply(service: &BlockMasterService, clock: &ManualTimeSource, ids: &[WorkerId], op: Op) {
        let far_future = Timestamp::from_millis(u64::MAX / 2);
        match op {
            Op::Commit { worker, block, ssd } => {
                // Errors (full tier, inactive worker) are part of the game.
                let _ = service.commit_block(CommitBlockRequest {
                    worker_id: ids[worker],
                    tier_alias: if ssd { "SSD" } else { "MEM" }.to_string(),
                    block_id: block,
                    length: 50 + block * 25,
                });
            }
            Op::Evict { worker, block } => {
                let _ = service.heartbeat(HeartbeatRequest {
                    worker_id: ids[worker],
                    removed_block_ids: vec![block],
                    ..HeartbeatRequest::default()
                });
            }
            Op::Report { worker, mem } => {
                let _ = service.heartbeat(HeartbeatRequest {
                    worker_id: ids[worker],
                    used_bytes_on_tiers: used_on(&[("MEM", mem)]),
                    ..HeartbeatRequest::default()
                });
            }
            Op::Cache { worker, block } => {
                let host = worker_address(worker as u16 + 1).host;
                let _ = service.request_cache_permission(block, &host);
            }
            Op::CacheFailed { worker, block } => {
                let host = worker_address(worker as u16 + 1).host;
                service.cache_failed_decrease(block, &host);
            }
            Op::Lose { worker } => {
                // Only the chosen worker goes stale; the others heartbeat.
                clock.advance(Duration::from_secs(6));
                for (i, id) in ids.iter().enumerate() {
                    if i != worker {
                        let _ = service.heartbeat(HeartbeatRequest {
                            worker_id: *id,
                            ..HeartbeatRequest::default()
                        });
                    }
                }
                service.mark_workers_lost();
            }
            Op::Sweep => {
                service.reclaim_expired_grants_at(far_future, Duration::ZERO);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_accounting_survives_any_sequence(ops in prop::collection::vec(op(), 1..80)) {
            let (service, clock) = test_service();
            let ids: Vec<WorkerId> = (1..=3u16)
                .map(|n| {
                    let id = service.get_worker_id(&worker_address(n));
                    service
                        .register_worker(
                            RegistrationBuilder::new(id)
                                .tier("MEM", 1_000, 0)
                                .tier("SSD", 2_000, 0)
                                .build(),
                        )
                        .unwrap();
                    id
                })
                .collect();

            for op in ops {
                apply(&service, &clock, &ids, op);
                assert_aggregate_matches(&service);
            }
        }
    }
}
