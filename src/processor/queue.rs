//! Pull-based task queue backed by the coordinator's long-poll.

use super::backoff::{retry_with_backoff, RetryBackoff};
use crate::rpc::{CoordinatorClient, RpcError};
use crate::task::WorkerTask;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry policy applied to transient queue poll failures.
#[derive(Debug, Clone, Copy)]
pub struct QueueRetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: usize,
}

impl Default for QueueRetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Finite or infinite sequence of tasks handed out by the coordinator.
///
/// The sequence ends when the coordinator answers the poll with `null` or when
/// the shutdown token fires. Once ended, it stays ended.
pub struct TaskQueue {
    client: Arc<dyn CoordinatorClient>,
    policy: QueueRetryPolicy,
    shutdown: CancellationToken,
    closed: bool,
}

impl TaskQueue {
    pub fn new(
        client: Arc<dyn CoordinatorClient>,
        policy: QueueRetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            policy,
            shutdown,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Waits for the next task. `Ok(None)` means the queue is closed.
    ///
    /// A long-poll that times out without a task means the coordinator is idle;
    /// it is polled again immediately and does not count as a failed attempt.
    pub async fn next(&mut self) -> Result<Option<WorkerTask>> {
        if self.closed {
            return Ok(None);
        }

        let client = self.client.clone();
        let shutdown = self.shutdown.clone();

        loop {
            if shutdown.is_cancelled() {
                self.closed = true;
                return Ok(None);
            }

            let coordinator: &dyn CoordinatorClient = client.as_ref();
            let config = RetryBackoff::new(self.policy.initial_backoff, self.policy.max_backoff)
                .with_max_attempts(self.policy.max_attempts.max(1))
                .with_cancellation(&shutdown);

            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                result = retry_with_backoff(
                    config,
                    move |_| poll_once(coordinator),
                    |attempt, delay, err, will_retry| {
                        if will_retry {
                            tracing::warn!(
                                attempt,
                                retry_in_ms = delay.as_millis() as u64,
                                error = %err,
                                "task queue poll failed; retrying"
                            );
                        } else {
                            tracing::error!(attempt, error = %err, "task queue poll failed; giving up");
                        }
                    },
                ) => Some(result),
            };

            match polled {
                None => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(PollOutcome::Idle)) => {
                    tracing::trace!("task queue long-poll expired without a task");
                }
                Some(Ok(PollOutcome::Task(task))) => {
                    tracing::debug!(
                        task_id = task.task_id,
                        sector_id = task.sector_id,
                        task_type = %task.task_type,
                        "received task"
                    );
                    return Ok(Some(task));
                }
                Some(Ok(PollOutcome::Closed)) => {
                    tracing::info!("coordinator closed the task queue");
                    self.closed = true;
                    return Ok(None);
                }
                Some(Err(_)) if shutdown.is_cancelled() => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Err(err)) => {
                    self.closed = true;
                    return Err(err.context("task queue poll failed"));
                }
            }
        }
    }
}

enum PollOutcome {
    Task(WorkerTask),
    Closed,
    Idle,
}

async fn poll_once(coordinator: &dyn CoordinatorClient) -> Result<PollOutcome> {
    match coordinator.next_task().await {
        Ok(Some(task)) => Ok(PollOutcome::Task(task)),
        Ok(None) => Ok(PollOutcome::Closed),
        Err(err) if is_idle_poll(&err) => Ok(PollOutcome::Idle),
        Err(err) => Err(err),
    }
}

fn is_idle_poll(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<RpcError>(), Some(RpcError::Timeout { .. }))
}
