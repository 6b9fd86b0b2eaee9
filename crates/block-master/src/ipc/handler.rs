//! Request handlers for the worker and client services.
//!
//! Each handler logs the call, dispatches to the service and translates
//! domain errors into [`RpcError`]s.

use super::payloads::*;
use crate::ports::{BlockMasterClientApi, BlockMasterWorkerApi};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handler for calls made by workers.
pub struct BlockMasterWorkerHandler<S> {
    service: Arc<S>,
}

impl<S> Clone for BlockMasterWorkerHandler<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: BlockMasterWorkerApi> BlockMasterWorkerHandler<S> {
    /// Wrap a service.
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// Handle one worker request.
    pub fn handle(&self, request: WorkerRequest) -> Result<WorkerResponse, RpcError> {
        let method = request.method();
        debug!(method, ?request, "Worker RPC");

        let result = match request {
            WorkerRequest::GetServiceVersion => Ok(WorkerResponse::ServiceVersion(
                BLOCK_MASTER_WORKER_SERVICE_VERSION,
            )),
            WorkerRequest::GetWorkerId { address } => {
                Ok(WorkerResponse::WorkerId(self.service.get_worker_id(&address)))
            }
            WorkerRequest::RegisterWorker(req) => self
                .service
                .register_worker(req)
                .map(|()| WorkerResponse::Registered),
            WorkerRequest::Heartbeat(req) => {
                self.service.heartbeat(req).map(WorkerResponse::Command)
            }
            WorkerRequest::CommitBlock(req) => self
                .service
                .commit_block(req)
                .map(|()| WorkerResponse::Committed),
            WorkerRequest::GetCachePermission { block_id, host } => self
                .service
                .request_cache_permission(block_id, &host)
                .map(WorkerResponse::CachePermission),
            WorkerRequest::CacheFailedDecrease { block_id, host } => {
                self.service.cache_failed_decrease(block_id, &host);
                Ok(WorkerResponse::CacheReleased)
            }
        };

        result.map_err(|e| {
            let err = RpcError::from(e);
            warn!(method, code = ?err.code, error = %err.message, "Worker RPC failed");
            err
        })
    }
}

/// Handler for calls made by clients.
pub struct BlockMasterClientHandler<S> {
    service: Arc<S>,
}

impl<S> Clone for BlockMasterClientHandler<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: BlockMasterClientApi> BlockMasterClientHandler<S> {
    /// Wrap a service.
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// Handle one client request.
    pub fn handle(&self, request: ClientRequest) -> Result<ClientResponse, RpcError> {
        let method = request.method();
        debug!(method, ?request, "Client RPC");

        let result = match request {
            ClientRequest::GetServiceVersion => Ok(ClientResponse::ServiceVersion(
                BLOCK_MASTER_CLIENT_SERVICE_VERSION,
            )),
            ClientRequest::GetWorkerInfoList => Ok(ClientResponse::WorkerInfoList(
                self.service.get_worker_info_list(),
            )),
            ClientRequest::GetCapacityBytes => Ok(ClientResponse::CapacityBytes(
                self.service.get_capacity_bytes(),
            )),
            ClientRequest::GetUsedBytes => {
                Ok(ClientResponse::UsedBytes(self.service.get_used_bytes()))
            }
            ClientRequest::GetBlockInfo { block_id } => self
                .service
                .get_block_info(block_id)
                .map(ClientResponse::BlockInfo),
            ClientRequest::StoreChecksum { block_id, digest } => self
                .service
                .store_checksum(block_id, &digest)
                .map(|()| ClientResponse::ChecksumStored),
            ClientRequest::CheckConsistency { block_id, digest } => Ok(
                ClientResponse::Consistency(self.service.check_consistency(block_id, &digest)),
            ),
        };

        result.map_err(|e| {
            let err = RpcError::from(e);
            warn!(method, code = ?err.code, error = %err.message, "Client RPC failed");
            err
        })
    }
}
