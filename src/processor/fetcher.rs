//! Staging of the inputs a task needs before the sealer may run.

use crate::task::{TaskType, WorkerTask};
use crate::transfer::{ObjectTransfer, SectorCategory};
use anyhow::Result;
use std::sync::Arc;

const PRE_COMMIT_INPUTS: &[SectorCategory] = &[SectorCategory::Staged];
const COMMIT_INPUTS: &[SectorCategory] = &[SectorCategory::Sealed, SectorCategory::Cache];

#[derive(Clone)]
pub struct TaskFetcher {
    transfer: Arc<dyn ObjectTransfer>,
}

impl TaskFetcher {
    pub fn new(transfer: Arc<dyn ObjectTransfer>) -> Self {
        Self { transfer }
    }

    /// Objects that must be present locally before sealing a task of this type.
    pub fn required_objects(task_type: TaskType) -> &'static [SectorCategory] {
        match task_type {
            TaskType::PreCommit => PRE_COMMIT_INPUTS,
            TaskType::Commit => COMMIT_INPUTS,
            TaskType::Unknown(_) => &[],
        }
    }

    /// Fetches every required object in order, stopping at the first failure.
    /// Returns the total number of bytes staged.
    pub async fn fetch_inputs(&self, task: &WorkerTask) -> Result<u64> {
        let mut staged = 0u64;
        for &category in Self::required_objects(task.task_type) {
            let bytes = self
                .transfer
                .fetch(category, task.sector_id)
                .await
                .map_err(|err| anyhow::Error::new(err).context("fetch failed"))?;
            tracing::debug!(
                task_id = task.task_id,
                sector_id = task.sector_id,
                category = %category,
                bytes,
                "staged task input"
            );
            staged = staged.saturating_add(bytes);
        }
        Ok(staged)
    }
}
