use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, FakeSealer, FAKE_RSPCO},
    mock_coordinator::{task_payload, MockCoordinator, MockCoordinatorServer},
};
use anyhow::Result;
use sealworker::{
    IntakeSummary, Runner, SealArtifact, SealRes, SealResult, WorkerConfig, WorkerConfigBuilder,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::time::timeout;

const MINER: &str = "t01000";
const RUN_DEADLINE: Duration = Duration::from_secs(20);

struct Harness {
    coordinator: MockCoordinator,
    server: MockCoordinatorServer,
    repo: TempDir,
    sealer_calls: Arc<AtomicUsize>,
}

impl Harness {
    async fn start() -> Result<Self> {
        init_tracing();
        let coordinator = MockCoordinator::new(MINER, 2048);
        let server = MockCoordinatorServer::start(coordinator.clone()).await?;
        Ok(Self {
            coordinator,
            server,
            repo: tempfile::tempdir()?,
            sealer_calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn runner(&self) -> Result<Runner> {
        self.runner_with(WorkerConfig::builder())
    }

    fn runner_with(&self, builder: WorkerConfigBuilder) -> Result<Runner> {
        let config = builder
            .rpc_url(self.server.rpc_url())
            .repo(self.repo.path())
            .queue_retry_max_attempts(1)
            .build()?;
        assert_eq!(config.endpoint(), self.server.endpoint());

        let calls = self.sealer_calls.clone();
        Ok(Runner::new(config, move |params| {
            assert_eq!(params.sector_size, 2048);
            assert_eq!(params.worker_threads, 1);
            Ok(FakeSealer::new(params, calls))
        }))
    }

    async fn run(&self) -> Result<IntakeSummary> {
        self.run_with(self.runner()?).await
    }

    async fn run_with(&self, runner: Runner) -> Result<IntakeSummary> {
        timeout(RUN_DEADLINE, runner.run())
            .await
            .map_err(|_| anyhow::anyhow!("worker did not drain the queue in time"))?
    }

    fn decoded_reports(&self) -> Vec<(u64, SealResult)> {
        self.coordinator
            .reports()
            .into_iter()
            .map(|(task_id, raw): (u64, Value)| {
                let wire: SealRes = serde_json::from_value(raw).expect("WorkerDone payload decodes");
                (task_id, SealResult::from(wire))
            })
            .collect()
    }
}

#[tokio::test]
async fn precommit_then_commit_round_trip() -> Result<()> {
    let harness = Harness::start().await?;
    let name = harness.coordinator.sector_name(7);
    harness
        .coordinator
        .put_object("staged", &name, b"unsealed sector".to_vec());
    harness
        .coordinator
        .put_object("cache", &name, b"tree-r".to_vec());
    harness.coordinator.enqueue(task_payload(0, 1, 7));
    harness.coordinator.enqueue(task_payload(1, 2, 7));

    let summary = harness.run().await?;

    assert_eq!(
        summary,
        IntakeSummary {
            processed: 2,
            succeeded: 2,
            failed: 0,
            report_failures: 0,
        }
    );
    assert_eq!(
        harness.decoded_reports(),
        vec![
            (1, SealResult::Success(SealArtifact::PreCommit(FAKE_RSPCO))),
            (2, SealResult::Success(SealArtifact::Commit(vec![0xaa, 0xbb]))),
        ]
    );
    let sealed = harness
        .coordinator
        .object("sealed", &name)
        .expect("sealed replica pushed back");
    assert_eq!(sealed.as_ref(), b"sealed:unsealed sector");
    assert_eq!(harness.sealer_calls.load(Ordering::SeqCst), 2);

    // The precommit report carries commitments only; the proof travels as null.
    let (_, raw) = &harness.coordinator.reports()[0];
    assert_eq!(raw["Err"], "");
    assert!(raw["Proof"].is_null());

    harness.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unknown_task_type_is_reported_without_transfers() -> Result<()> {
    let harness = Harness::start().await?;
    harness.coordinator.enqueue(task_payload(99, 5, 7));

    let summary = harness.run().await?;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        harness.decoded_reports(),
        vec![(5, SealResult::Failure("unknown task type 99".to_string()))]
    );
    assert_eq!(harness.coordinator.object_requests(), 0);
    assert_eq!(harness.sealer_calls.load(Ordering::SeqCst), 0);

    harness.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn missing_input_fails_task_before_sealing() -> Result<()> {
    let harness = Harness::start().await?;
    harness.coordinator.enqueue(task_payload(0, 3, 11));

    let summary = harness.run().await?;

    assert_eq!(summary.failed, 1);
    let reports = harness.decoded_reports();
    assert_eq!(reports.len(), 1);
    let reason = reports[0].1.error().expect("task failed");
    assert!(reason.starts_with("fetch failed:"), "{reason}");
    assert!(reason.contains("404"), "{reason}");
    assert_eq!(harness.sealer_calls.load(Ordering::SeqCst), 0);
    // Only the failed GET reached the object store.
    assert_eq!(harness.coordinator.object_requests(), 1);
    assert!(harness
        .coordinator
        .object("sealed", &harness.coordinator.sector_name(11))
        .is_none());

    harness.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn empty_queue_exits_cleanly() -> Result<()> {
    let harness = Harness::start().await?;

    let summary = harness.run().await?;

    assert_eq!(summary, IntakeSummary::default());
    assert!(harness.coordinator.reports().is_empty());
    for category in ["staged", "sealed", "cache"] {
        assert!(harness.repo.path().join(category).is_dir());
    }

    harness.server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn idle_long_polls_keep_the_worker_waiting() -> Result<()> {
    let harness = Harness::start().await?;
    harness
        .coordinator
        .stall_queue_polls(3, Duration::from_millis(600));
    harness.coordinator.enqueue(task_payload(99, 8, 7));

    // Each stalled poll outlives the client deadline; with one retry attempt
    // allowed, counting them as failures would end the run with an error.
    let runner = harness.runner_with(
        WorkerConfig::builder().queue_poll_timeout(Duration::from_millis(150)),
    )?;
    let summary = harness.run_with(runner).await?;

    assert_eq!(summary.processed, 1);
    assert_eq!(
        harness.decoded_reports(),
        vec![(8, SealResult::Failure("unknown task type 99".to_string()))]
    );
    // Three stalled polls, the one that delivered the task, and the final `null`.
    assert_eq!(harness.coordinator.queue_polls(), 5);

    harness.server.shutdown().await;
    Ok(())
}
