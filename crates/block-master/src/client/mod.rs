//! # Block Master Client
//!
//! Client-side wrapper issuing every call through a [`RetryPolicy`]. The
//! master never sees retries; it only receives repeated idempotent calls.

pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};

use crate::domain::{BlockId, BlockInfo, WorkerInfo};
use crate::ipc::{
    BlockMasterClientHandler, ClientRequest, ClientResponse, RpcError,
    BLOCK_MASTER_CLIENT_SERVICE_VERSION,
};
use crate::ports::BlockMasterClientApi;
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Client-side errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The master returned an error (after retries, if retryable).
    #[error("RPC failed: {0}")]
    Rpc(#[from] RpcError),

    /// The master speaks a different service version.
    #[error("Service version mismatch: client {expected}, master {actual}")]
    VersionMismatch {
        /// Version this client was built for
        expected: u32,
        /// Version the master reported
        actual: u32,
    },

    /// The master answered with the wrong response variant.
    #[error("Unexpected response to {method}: {response}")]
    UnexpectedResponse {
        /// Method called
        method: &'static str,
        /// Debug rendering of what came back
        response: String,
    },
}

/// Carries client requests to a master.
#[async_trait]
pub trait MasterTransport: Send + Sync {
    /// Send one request and wait for the reply.
    async fn call(&self, request: ClientRequest) -> Result<ClientResponse, RpcError>;
}

/// Transport calling a handler in the same process.
pub struct InProcessTransport<S> {
    handler: BlockMasterClientHandler<S>,
}

impl<S> InProcessTransport<S> {
    /// Wrap a handler.
    pub fn new(handler: BlockMasterClientHandler<S>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<S> MasterTransport for InProcessTransport<S>
where
    S: BlockMasterClientApi + Send + Sync,
{
    async fn call(&self, request: ClientRequest) -> Result<ClientResponse, RpcError> {
        self.handler.handle(request)
    }
}

/// Retrying block master client.
pub struct BlockMasterClient<T> {
    transport: T,
    policy: RetryPolicy,
}

macro_rules! expect_response {
    ($response:expr, $method:expr, $variant:pat => $value:expr) => {
        match $response {
            $variant => Ok($value),
            other => Err(ClientError::UnexpectedResponse {
                method: $method,
                response: format!("{other:?}"),
            }),
        }
    };
}

impl<T: MasterTransport> BlockMasterClient<T> {
    /// Connect and check the service version.
    pub async fn connect(transport: T, policy: RetryPolicy) -> Result<Self, ClientError> {
        let client = Self { transport, policy };
        let actual = expect_response!(
            client.call(ClientRequest::GetServiceVersion).await?,
            "GetServiceVersion",
            ClientResponse::ServiceVersion(v) => v
        )?;
        if actual != BLOCK_MASTER_CLIENT_SERVICE_VERSION {
            return Err(ClientError::VersionMismatch {
                expected: BLOCK_MASTER_CLIENT_SERVICE_VERSION,
                actual,
            });
        }
        info!(version = actual, "Connected to block master");
        Ok(client)
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call(&self, request: ClientRequest) -> Result<ClientResponse, ClientError> {
        let method = request.method();
        retry_with_backoff(&self.policy, method, || self.transport.call(request.clone()))
            .await
            .map_err(ClientError::from)
    }

    /// All workers, sorted by ID.
    pub async fn get_worker_info_list(&self) -> Result<Vec<WorkerInfo>, ClientError> {
        expect_response!(
            self.call(ClientRequest::GetWorkerInfoList).await?,
            "GetWorkerInfoList",
            ClientResponse::WorkerInfoList(list) => list
        )
    }

    /// Cluster capacity in bytes.
    pub async fn get_capacity_bytes(&self) -> Result<u64, ClientError> {
        expect_response!(
            self.call(ClientRequest::GetCapacityBytes).await?,
            "GetCapacityBytes",
            ClientResponse::CapacityBytes(bytes) => bytes
        )
    }

    /// Cluster used bytes.
    pub async fn get_used_bytes(&self) -> Result<u64, ClientError> {
        expect_response!(
            self.call(ClientRequest::GetUsedBytes).await?,
            "GetUsedBytes",
            ClientResponse::UsedBytes(bytes) => bytes
        )
    }

    /// Block length and locations.
    pub async fn get_block_info(&self, block_id: BlockId) -> Result<BlockInfo, ClientError> {
        expect_response!(
            self.call(ClientRequest::GetBlockInfo { block_id }).await?,
            "GetBlockInfo",
            ClientResponse::BlockInfo(info) => info
        )
    }

    /// Store a checksum digest.
    pub async fn store_checksum(&self, block_id: BlockId, digest: &str) -> Result<(), ClientError> {
        expect_response!(
            self.call(ClientRequest::StoreChecksum {
                block_id,
                digest: digest.to_string(),
            })
            .await?,
            "StoreChecksum",
            ClientResponse::ChecksumStored => ()
        )
    }

    /// Compare a digest against the stored one.
    pub async fn check_consistency(
        &self,
        block_id: BlockId,
        digest: &str,
    ) -> Result<bool, ClientError> {
        expect_response!(
            self.call(ClientRequest::CheckConsistency {
                block_id,
                digest: digest.to_string(),
            })
            .await?,
            "CheckConsistency",
            ClientResponse::Consistency(ok) => ok
        )
    }
}
