use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use sealworker::{
    PublicPieceInfo, RawSealPreCommitOutput, SealTicket, SealerParams, SealingInvoker,
    SectorCategory, SectorId,
};
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub const FAKE_RSPCO: RawSealPreCommitOutput = RawSealPreCommitOutput {
    comm_d: [0xd0; 32],
    comm_r: [0xe0; 32],
};

pub const FAKE_PROOF: &[u8] = &[0xaa, 0xbb];

/// Deterministic sealer: precommit writes `sealed:` followed by the staged
/// bytes into the sealed slot; commit checks its inputs and returns a fixed proof.
pub struct FakeSealer {
    params: SealerParams,
    calls: Arc<AtomicUsize>,
}

impl FakeSealer {
    pub fn new(params: SealerParams, calls: Arc<AtomicUsize>) -> Self {
        Self { params, calls }
    }

    fn path(&self, category: SectorCategory, sector_id: SectorId) -> std::path::PathBuf {
        self.params
            .layout
            .object_path(category, &self.sector_name(sector_id))
    }
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("missing sealer input {}", path.display()))
}

impl SealingInvoker for FakeSealer {
    fn sector_name(&self, sector_id: SectorId) -> String {
        self.params.naming.sector_name(sector_id)
    }

    fn seal_pre_commit<'a>(
        &'a self,
        sector_id: SectorId,
        _ticket: &'a SealTicket,
        _pieces: &'a [PublicPieceInfo],
    ) -> BoxFuture<'a, Result<RawSealPreCommitOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let staged = read(&self.path(SectorCategory::Staged, sector_id)).await?;
            let mut sealed = b"sealed:".to_vec();
            sealed.extend_from_slice(&staged);
            tokio::fs::write(self.path(SectorCategory::Sealed, sector_id), sealed).await?;
            Ok(FAKE_RSPCO)
        })
    }

    fn seal_commit<'a>(
        &'a self,
        sector_id: SectorId,
        _ticket: &'a SealTicket,
        _pieces: &'a [PublicPieceInfo],
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            read(&self.path(SectorCategory::Sealed, sector_id)).await?;
            read(&self.path(SectorCategory::Cache, sector_id)).await?;
            Ok(FAKE_PROOF.to_vec())
        })
    }
}
