//! Sequential intake loop: pull a task, process it, report it, repeat.

use super::pipeline::TaskProcessor;
use super::queue::TaskQueue;
use crate::rpc::CoordinatorClient;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Miner identity discovered from the coordinator at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub miner: String,
    pub sector_size: u64,
}

impl WorkerIdentity {
    /// Asks the coordinator for the actor address, then for its sector size.
    pub async fn discover(coordinator: &dyn CoordinatorClient) -> Result<Self> {
        let miner = coordinator
            .actor_address()
            .await
            .context("failed to query actor address")?;
        let sector_size = coordinator
            .actor_sector_size(&miner)
            .await
            .with_context(|| format!("failed to query sector size for {miner}"))?;

        tracing::info!(miner = %miner, sector_size, "discovered worker identity");
        Ok(Self { miner, sector_size })
    }
}

/// Counts accumulated over one run of the intake loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub report_failures: u64,
}

pub struct IntakeLoop {
    coordinator: Arc<dyn CoordinatorClient>,
    processor: TaskProcessor,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl IntakeLoop {
    pub fn new(
        coordinator: Arc<dyn CoordinatorClient>,
        processor: TaskProcessor,
        telemetry: Arc<Telemetry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            processor,
            telemetry,
            shutdown,
        }
    }

    /// Drains `queue` one task at a time until it closes.
    ///
    /// Every task that is taken off the queue is reported exactly once. A
    /// failed report is logged and counted; it never stops the loop.
    pub async fn run(&self, mut queue: TaskQueue) -> Result<IntakeSummary> {
        let mut summary = IntakeSummary::default();

        while let Some(task) = queue.next().await? {
            let result = self.processor.process(&task).await;
            let succeeded = result.is_success();

            summary.processed += 1;
            if succeeded {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            self.telemetry.record_task(succeeded);

            if let Err(err) = self.coordinator.worker_done(task.task_id, &result).await {
                summary.report_failures += 1;
                self.telemetry.record_report_failure();
                tracing::error!(
                    task_id = task.task_id,
                    sector_id = task.sector_id,
                    error = %format!("{err:#}"),
                    "failed to report task result"
                );
            }

            if self.shutdown.is_cancelled() {
                tracing::info!("shutdown requested; intake loop stopping");
                break;
            }
        }

        tracing::info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            report_failures = summary.report_failures,
            "intake loop finished"
        );
        Ok(summary)
    }
}
