//! Configurable knobs for the coordinator RPC client along with validation so
//! callers can reason about request and long-poll timeouts.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_QUEUE_POLL_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct RpcClientOptions {
    /// Deadline for identity lookups and result reports.
    pub request_timeout: Duration,
    /// Deadline for one long-poll on the worker queue.
    pub queue_poll_timeout: Duration,
    pub max_request_body_bytes: usize,
    pub max_response_body_bytes: usize,
}

impl Default for RpcClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            queue_poll_timeout: Duration::from_secs(DEFAULT_QUEUE_POLL_TIMEOUT_SECS),
            max_request_body_bytes: DEFAULT_HTTP_BODY_LIMIT_BYTES,
            max_response_body_bytes: DEFAULT_HTTP_BODY_LIMIT_BYTES,
        }
    }
}

impl RpcClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.queue_poll_timeout.is_zero() {
            bail!("queue_poll_timeout must be greater than 0");
        }
        if self.max_request_body_bytes == 0 {
            bail!("max_request_body_bytes must be greater than 0");
        }
        if self.max_response_body_bytes == 0 {
            bail!("max_response_body_bytes must be greater than 0");
        }
        Ok(())
    }

    /// Transport-level timeout; must outlast the longest per-call deadline.
    pub(crate) fn transport_timeout(&self) -> Duration {
        self.request_timeout
            .max(self.queue_poll_timeout)
            .saturating_add(Duration::from_secs(1))
    }
}
