//! Coordinator RPC client. Houses the `CoordinatorClient` seam consumed by the
//! intake loop, its `jsonrpsee` HTTP implementation, and the error type.

use crate::rpc::auth::build_auth_headers;
use crate::rpc::options::RpcClientOptions;
use crate::runtime::config::WorkerConfig;
use crate::task::{SealRes, SealResult, TaskId, WorkerTask};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

const ACTOR_ADDRESS: &str = "Filecoin.ActorAddress";
const ACTOR_SECTOR_SIZE: &str = "Filecoin.ActorSectorSize";
const WORKER_QUEUE: &str = "Filecoin.WorkerQueue";
const WORKER_DONE: &str = "Filecoin.WorkerDone";

#[derive(Debug)]
pub enum RpcError {
    Timeout {
        method: &'static str,
    },
    Call {
        method: &'static str,
        message: String,
    },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::Call { method, message } => write!(f, "rpc {method} call failed: {message}"),
        }
    }
}

impl std::error::Error for RpcError {}

/// Everything the worker needs from the coordinator.
pub trait CoordinatorClient: Send + Sync {
    fn actor_address(&self) -> BoxFuture<'_, Result<String>>;

    fn actor_sector_size<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<u64>>;

    /// Long-polls the worker queue. `Ok(None)` means the queue is closed.
    fn next_task(&self) -> BoxFuture<'_, Result<Option<WorkerTask>>>;

    fn worker_done<'a>(
        &'a self,
        task_id: TaskId,
        result: &'a SealResult,
    ) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone)]
pub struct AsyncRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
}

impl CoordinatorClient for AsyncRpcClient {
    fn actor_address(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.call(ACTOR_ADDRESS, rpc_params![], self.options.request_timeout))
    }

    fn actor_sector_size<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<u64>> {
        Box::pin(self.call(
            ACTOR_SECTOR_SIZE,
            rpc_params![address],
            self.options.request_timeout,
        ))
    }

    fn next_task(&self) -> BoxFuture<'_, Result<Option<WorkerTask>>> {
        Box::pin(self.call(WORKER_QUEUE, rpc_params![], self.options.queue_poll_timeout))
    }

    fn worker_done<'a>(
        &'a self,
        task_id: TaskId,
        result: &'a SealResult,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let wire = SealRes::from(result);
            let _: serde_json::Value = self
                .call(
                    WORKER_DONE,
                    rpc_params![task_id, wire],
                    self.options.request_timeout,
                )
                .await?;
            Ok(())
        })
    }
}

impl AsyncRpcClient {
    pub fn new(url: impl Into<String>, token: Option<&str>) -> Result<Self> {
        Self::with_options(url, token, RpcClientOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        token: Option<&str>,
        options: RpcClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let headers = build_auth_headers(token)?;
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.transport_timeout())
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
        })
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        config.validate()?;
        let options = RpcClientOptions {
            request_timeout: config.rpc_timeout(),
            queue_poll_timeout: config.queue_poll_timeout(),
            ..RpcClientOptions::default()
        };
        Self::with_options(config.rpc_url().to_owned(), config.api_token(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    async fn call<R>(&self, method: &'static str, params: ArrayParams, deadline: Duration) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let value = timeout(deadline, self.client.request::<R, _>(method, params))
            .await
            .map_err(|_| RpcError::Timeout { method })?
            .map_err(|err| RpcError::Call {
                method,
                message: err.to_string(),
            })?;
        tracing::trace!(method, "rpc call completed");
        Ok(value)
    }
}
