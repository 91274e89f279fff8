pub mod processor;
pub mod rpc;
pub mod runtime;
pub mod sealing;
pub mod task;
pub mod transfer;

pub use processor::fetcher::TaskFetcher;
pub use processor::intake::{IntakeLoop, IntakeSummary, WorkerIdentity};
pub use processor::pipeline::{TaskError, TaskProcessor, TaskProcessorParams, TaskStage};
pub use processor::queue::{QueueRetryPolicy, TaskQueue};
pub use rpc::{AsyncRpcClient, CoordinatorClient, RpcClientOptions, RpcError};
pub use runtime::config::{WorkerConfig, WorkerConfigBuilder, WorkerConfigParams};
pub use runtime::hooks::{TransferDirection, TransferObserver};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use sealing::{CommandSealer, SealerParams, SealingInvoker, SectorNaming};
pub use task::{
    PublicPieceInfo, RawSealPreCommitOutput, SealArtifact, SealRes, SealResult, SealTicket,
    SectorId, TaskId, TaskType, WorkerTask,
};
pub use transfer::{HttpObjectTransfer, ObjectTransfer, SectorCategory, StorageLayout, TransferError};
