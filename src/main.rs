use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sealworker::{
    CommandSealer, IntakeSummary, Runner, TransferDirection, TransferObserver, WorkerConfig,
};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:1234/rpc/v0";
const DEFAULT_REPO: &str = ".sealworker";
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 0;
const DEFAULT_PROGRESS: bool = false;

#[tokio::main]
async fn main() -> Result<()> {
    sealworker::init_tracing();

    let args = WorkerArgs::from_env()?;
    let config = args.to_worker_config()?;

    let program = args.seal_command.clone();
    let program_args = args.seal_args.clone();
    let mut runner = Runner::new(config, move |params| {
        Ok(CommandSealer::new(program, params).with_args(program_args))
    });

    let progress = args.progress.then(ProgressObserver::new);
    if let Some(progress) = &progress {
        runner = runner.with_observer(progress.clone());
    }

    let outcome = runner.run_until_ctrl_c().await;
    if let Some(progress) = &progress {
        progress.finish();
    }

    let summary = outcome?;
    log_summary(&summary);
    Ok(())
}

struct WorkerArgs {
    rpc_url: String,
    endpoint: Option<String>,
    api_token: Option<String>,
    repo: String,
    seal_command: String,
    seal_args: Vec<String>,
    step_timeout_secs: u64,
    progress: bool,
}

impl WorkerArgs {
    fn from_env() -> Result<Self> {
        let rpc_url = read_env_or_default("SEALWORKER_RPC_URL", DEFAULT_RPC_URL);
        let endpoint = read_env("SEALWORKER_ENDPOINT");
        let api_token = read_env("SEALWORKER_API_TOKEN");
        let repo = read_env_or_default("SEALWORKER_REPO", DEFAULT_REPO);
        let Some(seal_command) = read_env("SEALWORKER_SEAL_COMMAND") else {
            bail!("SEALWORKER_SEAL_COMMAND must name the sealing program");
        };
        let seal_args = match read_env("SEALWORKER_SEAL_ARGS") {
            Some(raw) => parse_seal_args(&raw)?,
            None => Vec::new(),
        };
        let step_timeout_secs =
            parse_env_with_default::<u64>("SEALWORKER_STEP_TIMEOUT_SECS", DEFAULT_STEP_TIMEOUT_SECS)?;
        let progress = parse_env_with_default::<bool>("SEALWORKER_PROGRESS", DEFAULT_PROGRESS)?;

        Ok(Self {
            rpc_url,
            endpoint,
            api_token,
            repo,
            seal_command,
            seal_args,
            step_timeout_secs,
            progress,
        })
    }

    fn to_worker_config(&self) -> Result<WorkerConfig> {
        let mut builder = WorkerConfig::builder()
            .rpc_url(self.rpc_url.clone())
            .repo(self.repo.clone());
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint(endpoint.clone());
        }
        if let Some(token) = &self.api_token {
            builder = builder.api_token(token.clone());
        }
        if self.step_timeout_secs > 0 {
            builder = builder.step_timeout(Duration::from_secs(self.step_timeout_secs));
        }
        builder.build()
    }
}

/// Sealer arguments arrive as a JSON array so that paths with spaces survive.
fn parse_seal_args(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .with_context(|| format!("SEALWORKER_SEAL_ARGS must be a JSON array of strings, got '{raw}'"))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_or_default(key: &str, default: &str) -> String {
    read_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

fn log_summary(summary: &IntakeSummary) {
    tracing::info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        report_failures = summary.report_failures,
        "worker stopped"
    );
}

/// Renders object transfers on a terminal progress bar.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr_with_hz(8));
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {msg} {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TransferObserver for ProgressObserver {
    fn on_start(&self, direction: TransferDirection, object: &str, total_bytes: Option<u64>) {
        if let Some(total) = total_bytes {
            self.bar.set_length(total);
        }
        self.bar.set_position(0);
        self.bar.set_message(format!("{} {object}", direction.as_str()));
    }

    fn on_progress(&self, _object: &str, transferred: u64) {
        self.bar.set_position(transferred);
    }

    fn on_finish(&self, object: &str, transferred: u64) {
        self.bar.set_position(transferred);
        self.bar.println(format!("{object}: {transferred} bytes"));
    }
}
