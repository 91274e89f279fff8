use crate::processor::intake::{IntakeLoop, IntakeSummary, WorkerIdentity};
use crate::processor::pipeline::{TaskProcessor, TaskProcessorParams};
use crate::processor::queue::{QueueRetryPolicy, TaskQueue};
use crate::rpc::{AsyncRpcClient, CoordinatorClient};
use crate::runtime::config::WorkerConfig;
use crate::runtime::hooks::TransferObserver;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::sealing::{SealerParams, SealingInvoker, SectorNaming};
use crate::transfer::{HttpObjectTransfer, StorageLayout};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// The sealer runs one sector at a time with a single worker thread.
const SEALER_WORKER_THREADS: usize = 1;

type SealerFactory =
    Box<dyn FnOnce(SealerParams) -> Result<Arc<dyn SealingInvoker>> + Send + 'static>;

/// Bootstraps the worker and drives the intake loop until the queue closes or
/// shutdown is requested.
pub struct Runner {
    config: WorkerConfig,
    make_sealer: SealerFactory,
    observer: Option<Arc<dyn TransferObserver>>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl Runner {
    /// `make_sealer` is called once, after the miner identity is known, with the
    /// parameters the sealer must be bound to.
    pub fn new<S, F>(config: WorkerConfig, make_sealer: F) -> Self
    where
        S: SealingInvoker + 'static,
        F: FnOnce(SealerParams) -> Result<S> + Send + 'static,
    {
        let make_sealer: SealerFactory = Box::new(move |params| {
            let sealer = make_sealer(params)?;
            Ok(Arc::new(sealer) as Arc<dyn SealingInvoker>)
        });

        Self {
            config,
            make_sealer,
            observer: None,
            telemetry: Arc::new(Telemetry::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Discovers the worker identity, wires every component, and drains the
    /// coordinator's queue.
    pub async fn run(self) -> Result<IntakeSummary> {
        let Runner {
            config,
            make_sealer,
            observer,
            telemetry,
            shutdown,
        } = self;

        let layout = StorageLayout::new(config.repo());
        layout.ensure_dirs().await?;

        let coordinator: Arc<dyn CoordinatorClient> = Arc::new(
            AsyncRpcClient::from_config(&config).context("failed to build coordinator client")?,
        );
        let identity = WorkerIdentity::discover(coordinator.as_ref()).await?;
        let naming = SectorNaming::new(&identity.miner);

        let sealer = make_sealer(SealerParams {
            sector_size: identity.sector_size,
            naming: naming.clone(),
            worker_threads: SEALER_WORKER_THREADS,
            layout: layout.clone(),
        })
        .context("failed to construct sealer")?;

        let mut transfer = HttpObjectTransfer::new(config.endpoint(), layout, naming);
        if let Some(observer) = observer {
            transfer = transfer.with_observer(observer);
        }

        tracing::info!(
            rpc_url = config.rpc_url(),
            endpoint = config.endpoint(),
            repo = %config.repo().display(),
            miner = %identity.miner,
            sector_size = identity.sector_size,
            "sealing worker started"
        );

        let processor = TaskProcessor::new(TaskProcessorParams {
            transfer: Arc::new(transfer),
            sealer,
            telemetry: telemetry.clone(),
            step_timeout: config.step_timeout(),
            shutdown: shutdown.clone(),
        });
        let queue = TaskQueue::new(
            coordinator.clone(),
            QueueRetryPolicy {
                initial_backoff: config.queue_retry_initial_backoff(),
                max_backoff: config.queue_retry_max_backoff(),
                max_attempts: config.queue_retry_max_attempts(),
            },
            shutdown.clone(),
        );

        let metrics_shutdown = shutdown.child_token();
        let metrics = spawn_metrics_reporter(
            telemetry.clone(),
            metrics_shutdown.clone(),
            config.metrics_interval(),
        );

        let intake = IntakeLoop::new(coordinator, processor, telemetry, shutdown);
        let outcome = intake.run(queue).await;

        metrics_shutdown.cancel();
        if let Err(err) = metrics.await {
            tracing::warn!(error = %err, "metrics reporter terminated abnormally");
        }

        outcome
    }

    /// Runs until the queue closes, a Ctrl-C (SIGINT) is received, or the shutdown
    /// token is cancelled elsewhere. A task in flight at shutdown is reported as
    /// cancelled before the loop exits.
    pub async fn run_until_ctrl_c(self) -> Result<IntakeSummary> {
        let token = self.shutdown.clone();
        let signal_listener = tokio::spawn(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received; shutting down worker");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });

        let outcome = self.run().await;
        signal_listener.abort();
        outcome
    }
}
