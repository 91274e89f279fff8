use crate::task::{PublicPieceInfo, RawSealPreCommitOutput, SealTicket, SectorId};
use crate::transfer::StorageLayout;
use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Deterministic, collision-free sector naming: `s-{miner}-{sector_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorNaming {
    miner: Arc<str>,
}

impl SectorNaming {
    pub fn new(miner: impl AsRef<str>) -> Self {
        Self {
            miner: Arc::from(miner.as_ref()),
        }
    }

    pub fn miner(&self) -> &str {
        &self.miner
    }

    pub fn sector_name(&self, sector_id: SectorId) -> String {
        format!("s-{}-{}", self.miner, sector_id)
    }
}

/// Fixed parameters a sealer is constructed with once per worker process.
#[derive(Debug, Clone)]
pub struct SealerParams {
    pub sector_size: u64,
    pub naming: SectorNaming,
    pub worker_threads: usize,
    pub layout: StorageLayout,
}

/// External sealing capability consumed by the task processor.
///
/// Implementations are not required to tolerate concurrent sealing of the same
/// sector; the intake loop drives one task at a time.
pub trait SealingInvoker: Send + Sync {
    fn sector_name(&self, sector_id: SectorId) -> String;

    /// Seals the staged input for `sector_id`. On success the sealed object
    /// must exist at `{root}/sealed/{sector_name}`.
    fn seal_pre_commit<'a>(
        &'a self,
        sector_id: SectorId,
        ticket: &'a SealTicket,
        pieces: &'a [PublicPieceInfo],
    ) -> BoxFuture<'a, Result<RawSealPreCommitOutput>>;

    /// Produces the commit proof from the sealed replica and its cache.
    fn seal_commit<'a>(
        &'a self,
        sector_id: SectorId,
        ticket: &'a SealTicket,
        pieces: &'a [PublicPieceInfo],
    ) -> BoxFuture<'a, Result<Vec<u8>>>;
}
