//! Result records produced by the task processor.
//!
//! Internally a task outcome is a tagged [`SealResult`]; the coordinator still
//! expects its historical `{Err, Proof, Rspco}` record, so [`SealRes`] is the
//! wire form used only at the RPC boundary.

use serde::{Deserialize, Serialize};

/// Commitments produced by the precommit phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSealPreCommitOutput {
    #[serde(rename = "CommD")]
    pub comm_d: [u8; 32],
    #[serde(rename = "CommR")]
    pub comm_r: [u8; 32],
}

/// Artifact handed back to the coordinator on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealArtifact {
    PreCommit(RawSealPreCommitOutput),
    Commit(Vec<u8>),
}

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealResult {
    Success(SealArtifact),
    Failure(String),
}

impl SealResult {
    /// Builds a failure carrying the full context chain of `err`.
    pub fn from_error(err: &anyhow::Error) -> Self {
        SealResult::Failure(format!("{err:#}"))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SealResult::Success(_))
    }

    pub fn artifact(&self) -> Option<&SealArtifact> {
        match self {
            SealResult::Success(artifact) => Some(artifact),
            SealResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SealResult::Success(_) => None,
            SealResult::Failure(reason) => Some(reason),
        }
    }
}

/// Wire record accepted by `WorkerDone`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealRes {
    #[serde(rename = "Err", default)]
    pub err: String,
    #[serde(rename = "Proof", default, with = "base64_bytes")]
    pub proof: Vec<u8>,
    #[serde(rename = "Rspco", default)]
    pub rspco: RawSealPreCommitOutput,
}

impl From<&SealResult> for SealRes {
    fn from(result: &SealResult) -> Self {
        match result {
            SealResult::Success(SealArtifact::PreCommit(rspco)) => SealRes {
                rspco: *rspco,
                ..SealRes::default()
            },
            SealResult::Success(SealArtifact::Commit(proof)) => SealRes {
                proof: proof.clone(),
                ..SealRes::default()
            },
            SealResult::Failure(reason) => SealRes {
                err: reason.clone(),
                ..SealRes::default()
            },
        }
    }
}

impl From<SealRes> for SealResult {
    /// A non-empty `Err` always wins, even if artifact fields are populated.
    /// An empty `Proof` reads as a precommit result, which is why
    /// `TaskProcessor` fails a commit whose proof comes back empty.
    fn from(wire: SealRes) -> Self {
        if !wire.err.is_empty() {
            SealResult::Failure(wire.err)
        } else if !wire.proof.is_empty() {
            SealResult::Success(SealArtifact::Commit(wire.proof))
        } else {
            SealResult::Success(SealArtifact::PreCommit(wire.rspco))
        }
    }
}

/// Byte slices travel as base64 strings, with `null` standing in for empty.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if bytes.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => BASE64_STANDARD.decode(encoded).map_err(D::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
