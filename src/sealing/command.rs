//! Sealing backend that delegates each phase to an external program.
//!
//! The program is invoked as `<program> [args..] precommit|commit`. A JSON
//! request describing the sector is written to its stdin and the object paths
//! are also exported as environment variables. On success it must print a JSON
//! document on stdout: `{"CommD": [..], "CommR": [..]}` for precommit and
//! `{"Proof": "<base64>"}` for commit.

use super::invoker::{SealerParams, SealingInvoker};
use crate::task::{PublicPieceInfo, RawSealPreCommitOutput, SealRes, SealTicket, SectorId};
use crate::transfer::SectorCategory;
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const PHASE_PRE_COMMIT: &str = "precommit";
const PHASE_COMMIT: &str = "commit";

#[derive(Serialize)]
struct SealRequest<'a> {
    sector_id: SectorId,
    sector_name: &'a str,
    sector_size: u64,
    miner: &'a str,
    worker_threads: usize,
    staged_path: PathBuf,
    sealed_path: PathBuf,
    cache_path: PathBuf,
    ticket: &'a SealTicket,
    pieces: &'a [PublicPieceInfo],
}

#[derive(Debug, Clone)]
pub struct CommandSealer {
    program: PathBuf,
    args: Vec<String>,
    params: SealerParams,
}

impl CommandSealer {
    pub fn new(program: impl Into<PathBuf>, params: SealerParams) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            params,
        }
    }

    /// Arguments placed before the phase name.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        phase: &'static str,
        sector_id: SectorId,
        ticket: &SealTicket,
        pieces: &[PublicPieceInfo],
    ) -> Result<T> {
        let sector_name = self.params.naming.sector_name(sector_id);
        let layout = &self.params.layout;
        let request = SealRequest {
            sector_id,
            sector_name: &sector_name,
            sector_size: self.params.sector_size,
            miner: self.params.naming.miner(),
            worker_threads: self.params.worker_threads,
            staged_path: layout.object_path(SectorCategory::Staged, &sector_name),
            sealed_path: layout.object_path(SectorCategory::Sealed, &sector_name),
            cache_path: layout.object_path(SectorCategory::Cache, &sector_name),
            ticket,
            pieces,
        };
        let payload = serde_json::to_vec(&request).context("failed to encode seal request")?;

        tracing::debug!(
            program = %self.program.display(),
            phase,
            sector_id,
            "invoking sealing program"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(phase)
            .env("SEALWORKER_SECTOR_NAME", &sector_name)
            .env("SEALWORKER_STAGED_PATH", &request.staged_path)
            .env("SEALWORKER_SEALED_PATH", &request.sealed_path)
            .env("SEALWORKER_CACHE_PATH", &request.cache_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        // The request is written while the output pipes drain, so a program that
        // writes before reading its input cannot stall on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                match stdin.write_all(&payload).await {
                    Ok(()) => Ok(()),
                    // The program may exit without reading its input; its exit status decides.
                    Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                    Err(err) => Err(err),
                }
            })
        });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("failed to wait for {}", self.program.display()))?;

        if let Some(writer) = writer {
            writer
                .await
                .context("seal request writer stopped")?
                .context("failed to write seal request")?;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                bail!("{phase} failed with {}", output.status);
            }
            bail!("{phase} failed with {}: {stderr}", output.status);
        }

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("invalid {phase} output from {}", self.program.display()))
    }
}

impl SealingInvoker for CommandSealer {
    fn sector_name(&self, sector_id: SectorId) -> String {
        self.params.naming.sector_name(sector_id)
    }

    fn seal_pre_commit<'a>(
        &'a self,
        sector_id: SectorId,
        ticket: &'a SealTicket,
        pieces: &'a [PublicPieceInfo],
    ) -> BoxFuture<'a, Result<RawSealPreCommitOutput>> {
        Box::pin(async move {
            let output: RawSealPreCommitOutput = self
                .invoke(PHASE_PRE_COMMIT, sector_id, ticket, pieces)
                .await?;

            let sealed = self
                .params
                .layout
                .object_path(SectorCategory::Sealed, &self.sector_name(sector_id));
            if tokio::fs::metadata(&sealed).await.is_err() {
                bail!("sealer did not produce {}", sealed.display());
            }
            Ok(output)
        })
    }

    fn seal_commit<'a>(
        &'a self,
        sector_id: SectorId,
        ticket: &'a SealTicket,
        pieces: &'a [PublicPieceInfo],
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let output: SealRes = self.invoke(PHASE_COMMIT, sector_id, ticket, pieces).await?;
            if !output.err.is_empty() {
                bail!("{}", output.err);
            }
            if output.proof.is_empty() {
                bail!("commit output carried no proof");
            }
            Ok(output.proof)
        })
    }
}
