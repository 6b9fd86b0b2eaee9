//! # Worker Lifecycle Flows
//!
//! Simulated workers speaking the worker RPC surface end to end:
//!
//! 1. Version check, ID assignment, full registration
//! 2. Commits and heartbeats
//! 3. Loss detection by the runtime sweep
//! 4. `Register` command on the next heartbeat, then re-registration

#[cfg(test)]
mod tests {
    use block_master::test_utils::{used_on, worker_address, ManualTimeSource, RegistrationBuilder};
    use block_master::{
        BlockMasterConfig, BlockMasterService, BlockMasterWorkerHandler, ClientRequest,
        ClientResponse, CommitBlockRequest, ErrorCode, HeartbeatRequest, RpcError, WorkerCommand,
        WorkerId, WorkerInfo, WorkerNetAddress, WorkerRequest, WorkerResponse, WorkerState,
        BLOCK_MASTER_WORKER_SERVICE_VERSION,
    };
    use master_runtime::MasterRuntime;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// A worker process as seen by the master.
    struct SimWorker {
        handler: BlockMasterWorkerHandler<BlockMasterService>,
        address: WorkerNetAddress,
        id: WorkerId,
        mem_total: u64,
        blocks: Vec<u64>,
    }

    impl SimWorker {
        fn start(
            handler: BlockMasterWorkerHandler<BlockMasterService>,
            n: u16,
            mem_total: u64,
        ) -> Self {
            assert_eq!(
                handler.handle(WorkerRequest::GetServiceVersion),
                Ok(WorkerResponse::ServiceVersion(
                    BLOCK_MASTER_WORKER_SERVICE_VERSION
                ))
            );
            let mut worker = Self {
                handler,
                address: worker_address(n),
                id: 0,
                mem_total,
                blocks: Vec::new(),
            };
            worker.register();
            worker
        }

        fn register(&mut self) {
            let Ok(WorkerResponse::WorkerId(id)) =
                self.handler.handle(WorkerRequest::GetWorkerId {
                    address: self.address.clone(),
                })
            else {
                panic!("expected worker id");
            };
            self.id = id;

            let request = RegistrationBuilder::new(id)
                .tier("MEM", self.mem_total, self.used())
                .blocks("MEM", &self.blocks)
                .build();
            assert_eq!(
                self.handler.handle(WorkerRequest::RegisterWorker(request)),
                Ok(WorkerResponse::Registered)
            );
        }

        fn used(&self) -> u64 {
            self.blocks.len() as u64 * 100
        }

        fn commit(&mut self, block_id: u64) -> Result<WorkerResponse, RpcError> {
            let response = self.handler.handle(WorkerRequest::CommitBlock(CommitBlockRequest {
                worker_id: self.id,
                tier_alias: "MEM".to_string(),
                block_id,
                length: 100,
            }))?;
            self.blocks.push(block_id);
            Ok(response)
        }

        fn heartbeat(&mut self) -> Result<WorkerCommand, RpcError> {
            let request = HeartbeatRequest {
                worker_id: self.id,
                used_bytes_on_tiers: used_on(&[("MEM", self.used())]),
                ..HeartbeatRequest::default()
            };
            match self.handler.handle(WorkerRequest::Heartbeat(request))? {
                WorkerResponse::Command(WorkerCommand::Register) => {
                    self.register();
                    Ok(WorkerCommand::Register)
                }
                WorkerResponse::Command(command) => Ok(command),
                other => panic!("unexpected heartbeat reply {other:?}"),
            }
        }

        fn evict(&mut self, block_id: u64) {
            self.blocks.retain(|b| *b != block_id);
            let request = HeartbeatRequest {
                worker_id: self.id,
                used_bytes_on_tiers: used_on(&[("MEM", self.used())]),
                removed_block_ids: vec![block_id],
                added_blocks_on_tiers: HashMap::new(),
            };
            self.handler
                .handle(WorkerRequest::Heartbeat(request))
                .unwrap();
        }
    }

    fn runtime() -> (MasterRuntime, ManualTimeSource) {
        let clock = ManualTimeSource::new(1_000);
        let runtime = MasterRuntime::with_time_source(
            BlockMasterConfig::for_testing(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (runtime, clock)
    }

    fn worker_list(runtime: &MasterRuntime) -> Vec<WorkerInfo> {
        match runtime
            .client_handler()
            .handle(ClientRequest::GetWorkerInfoList)
        {
            Ok(ClientResponse::WorkerInfoList(list)) => list,
            other => panic!("unexpected reply {other:?}"),
        }
    }

    fn capacity_and_used(runtime: &MasterRuntime) -> (u64, u64) {
        let client = runtime.client_handler();
        let Ok(ClientResponse::CapacityBytes(capacity)) =
            client.handle(ClientRequest::GetCapacityBytes)
        else {
            panic!("expected capacity");
        };
        let Ok(ClientResponse::UsedBytes(used)) = client.handle(ClientRequest::GetUsedBytes)
        else {
            panic!("expected used bytes");
        };
        (capacity, used)
    }

    // =============================================================================
    // TESTS
    // =============================================================================

    #[test]
    fn test_workers_join_and_commit() {
        let (runtime, _) = runtime();
        let mut a = SimWorker::start(runtime.worker_handler(), 1, 1_000);
        let mut b = SimWorker::start(runtime.worker_handler(), 2, 500);
        assert_ne!(a.id, b.id);

        a.commit(1).unwrap();
        a.commit(2).unwrap();
        b.commit(1).unwrap();
        assert_eq!(a.heartbeat(), Ok(WorkerCommand::Nothing));
        assert_eq!(b.heartbeat(), Ok(WorkerCommand::Nothing));

        assert_eq!(capacity_and_used(&runtime), (1_500, 300));

        let list = worker_list(&runtime);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, a.id);
        assert_eq!(list[0].block_count, 2);
        assert_eq!(list[1].block_count, 1);

        let Ok(ClientResponse::BlockInfo(info)) = runtime
            .client_handler()
            .handle(ClientRequest::GetBlockInfo { block_id: 1 })
        else {
            panic!("expected block info");
        };
        let hosts: Vec<_> = info.locations.iter().map(|l| l.worker_id).collect();
        assert_eq!(hosts, vec![a.id, b.id]);
    }

    #[test]
    fn test_over_capacity_commit_is_resource_exhausted() {
        let (runtime, _) = runtime();
        let mut worker = SimWorker::start(runtime.worker_handler(), 1, 150);
        worker.commit(1).unwrap();

        let err = worker.commit(2).unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceExhausted);
        assert_eq!(capacity_and_used(&runtime), (150, 100));
    }

    #[test]
    fn test_evicted_block_disappears() {
        let (runtime, _) = runtime();
        let mut worker = SimWorker::start(runtime.worker_handler(), 1, 1_000);
        worker.commit(7).unwrap();
        worker.evict(7);

        let err = runtime
            .client_handler()
            .handle(ClientRequest::GetBlockInfo { block_id: 7 })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(capacity_and_used(&runtime), (1_000, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_worker_is_lost_then_rejoins() {
        let (mut runtime, clock) = runtime();
        let mut quiet = SimWorker::start(runtime.worker_handler(), 1, 1_000);
        let mut chatty = SimWorker::start(runtime.worker_handler(), 2, 1_000);
        quiet.commit(42).unwrap();
        runtime.start();

        // Only one worker keeps heartbeating past the timeout.
        for _ in 0..6 {
            clock.advance(Duration::from_secs(1));
            chatty.heartbeat().unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
        }

        let list = worker_list(&runtime);
        assert_eq!(list[0].state, WorkerState::Lost);
        assert_eq!(list[1].state, WorkerState::Active);
        assert_eq!(capacity_and_used(&runtime), (1_000, 0));

        // Locations survive the loss.
        let Ok(ClientResponse::BlockInfo(info)) = runtime
            .client_handler()
            .handle(ClientRequest::GetBlockInfo { block_id: 42 })
        else {
            panic!("expected block info");
        };
        assert_eq!(info.locations[0].worker_id, quiet.id);

        let old_id = quiet.id;
        assert_eq!(quiet.heartbeat(), Ok(WorkerCommand::Register));
        assert_eq!(quiet.id, old_id);
        assert_eq!(quiet.heartbeat(), Ok(WorkerCommand::Nothing));

        let list = worker_list(&runtime);
        assert!(list.iter().all(|w| w.state == WorkerState::Active));
        assert_eq!(capacity_and_used(&runtime), (2_000, 100));

        runtime.shutdown().await;
    }

    #[test]
    fn test_heartbeat_from_unregistered_id_is_not_found() {
        let (runtime, _) = runtime();
        let handler = runtime.worker_handler();
        let Ok(WorkerResponse::WorkerId(id)) = handler.handle(WorkerRequest::GetWorkerId {
            address: worker_address(3),
        }) else {
            panic!("expected worker id");
        };

        let err = handler
            .handle(WorkerRequest::Heartbeat(HeartbeatRequest {
                worker_id: id,
                ..HeartbeatRequest::default()
            }))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
