//! # Block Master Benchmarks
//!
//! Hot paths of a busy master:
//! - heartbeat fan-in from many workers
//! - commit of fresh and already-charged blocks
//! - block location lookup
//! - cluster aggregate reads under registration churn

use block_master::test_utils::{used_on, worker_address, ManualTimeSource, RegistrationBuilder};
use block_master::{
    BlockMasterClientApi, BlockMasterConfig, BlockMasterService, BlockMasterWorkerApi,
    CommitBlockRequest, HeartbeatRequest, WorkerId,
};
use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// A service with `workers` registered workers, each with a 1 GiB MEM tier.
pub fn cluster(workers: u16) -> (Arc<BlockMasterService>, Vec<WorkerId>) {
    let service = Arc::new(BlockMasterService::new(
        BlockMasterConfig::for_testing(),
        Arc::new(ManualTimeSource::new(1_000)),
    ));
    let ids = (1..=workers)
        .map(|n| {
            let id = service.get_worker_id(&worker_address(n));
            service
                .register_worker(RegistrationBuilder::new(id).tier("MEM", 1 << 30, 0).build())
                .expect("register");
            id
        })
        .collect();
    (service, ids)
}

fn commit_request(worker_id: WorkerId, block_id: u64) -> CommitBlockRequest {
    CommitBlockRequest {
        worker_id,
        tier_alias: "MEM".to_string(),
        block_id,
        length: 4_096,
    }
}

pub fn bench_heartbeat_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("block-master-heartbeat");
    group.measurement_time(Duration::from_secs(5));

    for workers in [16u16, 256, 1_024] {
        let (service, ids) = cluster(workers);
        group.throughput(Throughput::Elements(workers as u64));
        group.bench_with_input(BenchmarkId::new("fan_in", workers), &ids, |b, ids| {
            let mut rng = rand::thread_rng();
            b.iter(|| {
                for &id in ids {
                    let request = HeartbeatRequest {
                        worker_id: id,
                        used_bytes_on_tiers: used_on(&[("MEM", rng.gen_range(0..1 << 20))]),
                        ..HeartbeatRequest::default()
                    };
                    black_box(service.heartbeat(request).expect("heartbeat"));
                }
            })
        });
    }

    group.finish();
}

pub fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("block-master-commit");

    let (service, ids) = cluster(4);
    let mut next_block = 0u64;
    group.bench_function("fresh_block", |b| {
        b.iter(|| {
            next_block += 1;
            let worker = ids[(next_block % 4) as usize];
            // Tiers are 1 GiB; drop blocks before they fill up.
            if next_block % 100_000 == 0 {
                for &id in &ids {
                    service
                        .register_worker(RegistrationBuilder::new(id).tier("MEM", 1 << 30, 0).build())
                        .expect("re-register");
                }
            }
            black_box(service.commit_block(commit_request(worker, next_block)))
        })
    });

    let (service, ids) = cluster(1);
    service
        .commit_block(commit_request(ids[0], 7))
        .expect("commit");
    group.bench_function("repeated_block", |b| {
        b.iter(|| black_box(service.commit_block(commit_request(ids[0], 7))))
    });

    group.finish();
}

pub fn bench_block_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("block-master-lookup");

    let (service, ids) = cluster(64);
    for block in 0..10_000u64 {
        for replica in 0..3 {
            let worker = ids[((block + replica) % 64) as usize];
            service
                .commit_block(commit_request(worker, block))
                .expect("commit");
        }
    }

    group.bench_function("get_block_info_3_replicas", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| black_box(service.get_block_info(rng.gen_range(0..10_000))))
    });
    group.bench_function("get_worker_info_list_64", |b| {
        b.iter(|| black_box(service.get_worker_info_list()))
    });

    group.finish();
}

pub fn bench_aggregate_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("block-master-aggregate");

    let (service, _) = cluster(256);
    group.bench_function("capacity_and_used", |b| {
        b.iter(|| {
            black_box(service.get_capacity_bytes());
            black_box(service.get_used_bytes());
        })
    });

    group.finish();
}
