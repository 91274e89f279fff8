//! Per-task state machine.
//!
//! A task moves `Received → TypeValidated → Fetched → Sealed → Pushed` and is
//! then reported. The first failing step short-circuits the pipeline and the
//! task is reported as failed; nothing is retried. Each step can be bounded by
//! a deadline and is interrupted when the shutdown token fires.

use super::fetcher::TaskFetcher;
use crate::runtime::telemetry::Telemetry;
use crate::sealing::SealingInvoker;
use crate::task::{SealArtifact, SealResult, TaskType, WorkerTask};
use crate::transfer::{ObjectTransfer, SectorCategory};
use anyhow::{anyhow, Error as AnyError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Received,
    TypeValidated,
    Fetched,
    Sealed,
    Pushed,
    Reported,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStage::Received => "received",
            TaskStage::TypeValidated => "type-validated",
            TaskStage::Fetched => "fetched",
            TaskStage::Sealed => "sealed",
            TaskStage::Pushed => "pushed",
            TaskStage::Reported => "reported",
        };
        f.write_str(label)
    }
}

/// Failure of a task, tagged with the last stage it reached.
#[derive(Debug)]
pub struct TaskError {
    stage: TaskStage,
    source: AnyError,
}

impl TaskError {
    pub fn new(stage: TaskStage, source: AnyError) -> Self {
        Self { stage, source }
    }

    pub fn stage(&self) -> TaskStage {
        self.stage
    }

    /// Reason string reported to the coordinator.
    pub fn reason(&self) -> String {
        format!("{:#}", self.source)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task failed after {} stage: {:#}", self.stage, self.source)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SealPhase {
    PreCommit,
    Commit,
}

pub struct TaskProcessorParams {
    pub transfer: Arc<dyn ObjectTransfer>,
    pub sealer: Arc<dyn SealingInvoker>,
    pub telemetry: Arc<Telemetry>,
    pub step_timeout: Option<Duration>,
    pub shutdown: CancellationToken,
}

pub struct TaskProcessor {
    fetcher: TaskFetcher,
    transfer: Arc<dyn ObjectTransfer>,
    sealer: Arc<dyn SealingInvoker>,
    telemetry: Arc<Telemetry>,
    step_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl TaskProcessor {
    pub fn new(params: TaskProcessorParams) -> Self {
        let TaskProcessorParams {
            transfer,
            sealer,
            telemetry,
            step_timeout,
            shutdown,
        } = params;

        Self {
            fetcher: TaskFetcher::new(transfer.clone()),
            transfer,
            sealer,
            telemetry,
            step_timeout,
            shutdown,
        }
    }

    /// Runs one task to completion and folds the outcome into a [`SealResult`].
    pub async fn process(&self, task: &WorkerTask) -> SealResult {
        match self.execute(task).await {
            Ok(artifact) => {
                tracing::info!(
                    task_id = task.task_id,
                    sector_id = task.sector_id,
                    task_type = %task.task_type,
                    "task completed"
                );
                SealResult::Success(artifact)
            }
            Err(err) => {
                tracing::warn!(
                    task_id = task.task_id,
                    sector_id = task.sector_id,
                    task_type = %task.task_type,
                    stage = %err.stage(),
                    error = %err.reason(),
                    "task failed"
                );
                SealResult::Failure(err.reason())
            }
        }
    }

    /// Drives the state machine and returns the artifact or the first failure.
    pub async fn execute(&self, task: &WorkerTask) -> Result<SealArtifact, TaskError> {
        let mut stage = TaskStage::Received;

        let phase = match task.task_type {
            TaskType::PreCommit => SealPhase::PreCommit,
            TaskType::Commit => SealPhase::Commit,
            TaskType::Unknown(raw) => {
                return Err(TaskError::new(stage, anyhow!("unknown task type {raw}")));
            }
        };
        stage = transition(task, stage, TaskStage::TypeValidated);

        let fetched = self
            .run_step(stage, self.fetcher.fetch_inputs(task))
            .await?;
        self.telemetry.record_fetched_bytes(fetched);
        stage = transition(task, stage, TaskStage::Fetched);

        let artifact = match phase {
            SealPhase::PreCommit => {
                let rspco = self
                    .run_step(
                        stage,
                        self.sealer.seal_pre_commit(
                            task.sector_id,
                            &task.seal_ticket,
                            &task.public_piece_info,
                        ),
                    )
                    .await?;
                SealArtifact::PreCommit(rspco)
            }
            SealPhase::Commit => {
                let proof = self
                    .run_step(
                        stage,
                        self.sealer.seal_commit(
                            task.sector_id,
                            &task.seal_ticket,
                            &task.public_piece_info,
                        ),
                    )
                    .await?;
                // An empty proof would reach the coordinator as a precommit result.
                if proof.is_empty() {
                    return Err(TaskError::new(
                        stage,
                        anyhow!("sealer returned an empty commit proof"),
                    ));
                }
                SealArtifact::Commit(proof)
            }
        };
        stage = transition(task, stage, TaskStage::Sealed);

        // The artifact is dropped if the push fails; only the push error is reported.
        if phase == SealPhase::PreCommit {
            let pushed = self
                .run_step(stage, async {
                    self.transfer
                        .push(SectorCategory::Sealed, task.sector_id)
                        .await
                        .map_err(AnyError::new)
                })
                .await?;
            self.telemetry.record_pushed_bytes(pushed);
            stage = transition(task, stage, TaskStage::Pushed);
        }

        transition(task, stage, TaskStage::Reported);
        Ok(artifact)
    }

    async fn run_step<T, F>(&self, stage: TaskStage, step: F) -> Result<T, TaskError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let bounded = async {
            match self.step_timeout {
                Some(limit) => timeout(limit, step)
                    .await
                    .map_err(|_| anyhow!("step timed out after {limit:?}"))?,
                None => step.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                Err(TaskError::new(stage, anyhow!("task cancelled by shutdown")))
            }
            result = bounded => result.map_err(|source| TaskError::new(stage, source)),
        }
    }
}

fn transition(task: &WorkerTask, from: TaskStage, to: TaskStage) -> TaskStage {
    tracing::debug!(
        task_id = task.task_id,
        sector_id = task.sector_id,
        from = %from,
        to = %to,
        "task stage transition"
    );
    to
}
