use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing what the worker has done so far.
#[derive(Default, Debug)]
pub struct Telemetry {
    tasks_processed: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    report_failures: AtomicU64,
    bytes_fetched: AtomicU64,
    bytes_pushed: AtomicU64,
}

impl Telemetry {
    pub fn record_task(&self, succeeded: bool) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_report_failure(&self) {
        self.report_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched_bytes(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_pushed_bytes(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.bytes_pushed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            tasks_processed: self.tasks_processed.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            report_failures: self.report_failures.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            bytes_pushed: self.bytes_pushed.load(Ordering::Relaxed),
        }
    }

    pub fn tasks_processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::Relaxed)
    }

    pub fn report_failures(&self) -> u64 {
        self.report_failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub report_failures: u64,
    pub bytes_fetched: u64,
    pub bytes_pushed: u64,
}

/// Spawns a background task that periodically logs task throughput and transfer volume.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "sealworker::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let processed_delta = current
                        .tasks_processed
                        .saturating_sub(last_snapshot.tasks_processed);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let tasks_per_hour = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        processed_delta as f64 * 3600.0 / elapsed
                    };

                    tracing::info!(
                        target: "sealworker::metrics",
                        tasks_per_hour = format!("{tasks_per_hour:.2}"),
                        processed = current.tasks_processed,
                        succeeded = current.tasks_succeeded,
                        failed = current.tasks_failed,
                        report_failures = current.report_failures,
                        bytes_fetched = current.bytes_fetched,
                        bytes_pushed = current.bytes_pushed,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
