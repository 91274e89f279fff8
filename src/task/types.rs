use serde::{Deserialize, Serialize};
use std::fmt;

pub type SectorId = u64;
pub type TaskId = u64;

const PRE_COMMIT_RAW: u64 = 0;
const COMMIT_RAW: u64 = 1;

/// Sealing phase requested by a task.
///
/// The coordinator encodes the phase as an integer. Values the worker does not
/// understand are kept as `Unknown` so the processor can reject the task and
/// report it, rather than the decoder silently dropping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum TaskType {
    PreCommit,
    Commit,
    Unknown(u64),
}

impl TaskType {
    pub fn raw(self) -> u64 {
        u64::from(self)
    }

    pub fn is_known(self) -> bool {
        !matches!(self, TaskType::Unknown(_))
    }
}

impl From<u64> for TaskType {
    fn from(raw: u64) -> Self {
        match raw {
            PRE_COMMIT_RAW => TaskType::PreCommit,
            COMMIT_RAW => TaskType::Commit,
            other => TaskType::Unknown(other),
        }
    }
}

impl From<TaskType> for u64 {
    fn from(task_type: TaskType) -> Self {
        match task_type {
            TaskType::PreCommit => PRE_COMMIT_RAW,
            TaskType::Commit => COMMIT_RAW,
            TaskType::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::PreCommit => write!(f, "precommit"),
            TaskType::Commit => write!(f, "commit"),
            TaskType::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// Chain randomness the sector is sealed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SealTicket {
    pub block_height: u64,
    pub ticket_bytes: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPieceInfo {
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "CommP")]
    pub comm_p: [u8; 32],
}

/// Immutable unit of work pulled from the coordinator queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTask {
    #[serde(rename = "Type")]
    pub task_type: TaskType,
    #[serde(rename = "TaskID")]
    pub task_id: TaskId,
    #[serde(rename = "SectorID")]
    pub sector_id: SectorId,
    #[serde(rename = "SealTicket")]
    pub seal_ticket: SealTicket,
    #[serde(rename = "Pieces", default)]
    pub public_piece_info: Vec<PublicPieceInfo>,
}
