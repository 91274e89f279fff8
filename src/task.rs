//! Task descriptors received from the coordinator queue and the result records
//! reported back once a task has run.

pub mod result;
pub mod types;

pub use result::{RawSealPreCommitOutput, SealArtifact, SealRes, SealResult};
pub use types::{PublicPieceInfo, SealTicket, SectorId, TaskId, TaskType, WorkerTask};
