use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use hyper::Uri;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;
const DEFAULT_QUEUE_POLL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_QUEUE_RETRY_INITIAL_BACKOFF_MS: u64 = 500;
const DEFAULT_QUEUE_RETRY_MAX_BACKOFF_SECS: u64 = 30;
const DEFAULT_QUEUE_RETRY_MAX_ATTEMPTS: usize = 10;

/// Runtime configuration for the sealing worker.
///
/// All instances must be constructed via [`WorkerConfig::builder`] or [`WorkerConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    rpc_url: String,
    endpoint: String,
    api_token: Option<String>,
    repo: PathBuf,
    rpc_timeout: Duration,
    queue_poll_timeout: Duration,
    step_timeout: Option<Duration>,
    queue_retry_initial_backoff: Duration,
    queue_retry_max_backoff: Duration,
    queue_retry_max_attempts: usize,
    metrics_interval: Duration,
}

pub struct WorkerConfigParams {
    pub rpc_url: String,
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub repo: PathBuf,
    pub rpc_timeout: Duration,
    pub queue_poll_timeout: Duration,
    pub step_timeout: Option<Duration>,
    pub queue_retry_initial_backoff: Duration,
    pub queue_retry_max_backoff: Duration,
    pub queue_retry_max_attempts: usize,
    pub metrics_interval: Duration,
}

impl WorkerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// When `endpoint` is absent the object store is assumed to live at the
    /// scheme and authority of `rpc_url`.
    pub fn new(params: WorkerConfigParams) -> Result<Self> {
        let WorkerConfigParams {
            rpc_url,
            endpoint,
            api_token,
            repo,
            rpc_timeout,
            queue_poll_timeout,
            step_timeout,
            queue_retry_initial_backoff,
            queue_retry_max_backoff,
            queue_retry_max_attempts,
            metrics_interval,
        } = params;

        let rpc_url = trimmed_string(rpc_url);
        validate_url(&rpc_url, "rpc_url")?;
        let endpoint = match endpoint.map(trimmed_string) {
            Some(endpoint) if !endpoint.is_empty() => endpoint,
            _ => derive_endpoint(&rpc_url)?,
        };

        let config = Self {
            rpc_url,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            api_token: api_token
                .map(trimmed_string)
                .filter(|token| !token.is_empty()),
            repo,
            rpc_timeout,
            queue_poll_timeout,
            step_timeout,
            queue_retry_initial_backoff,
            queue_retry_max_backoff,
            queue_retry_max_attempts,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Coordinator JSON-RPC URL.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Base URL of the coordinator's object store.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    /// Storage root holding the `cache`, `sealed` and `staged` directories.
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn queue_poll_timeout(&self) -> Duration {
        self.queue_poll_timeout
    }

    /// Optional deadline applied to each fetch, seal, and push step.
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout
    }

    pub fn queue_retry_initial_backoff(&self) -> Duration {
        self.queue_retry_initial_backoff
    }

    pub fn queue_retry_max_backoff(&self) -> Duration {
        self.queue_retry_max_backoff
    }

    pub fn queue_retry_max_attempts(&self) -> usize {
        self.queue_retry_max_attempts
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url, "rpc_url")?;
        validate_url(&self.endpoint, "endpoint")?;

        if self.repo.as_os_str().is_empty() {
            bail!("repo cannot be empty");
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.queue_poll_timeout.is_zero() {
            bail!("queue_poll_timeout must be greater than 0");
        }

        if matches!(self.step_timeout, Some(limit) if limit.is_zero()) {
            bail!("step_timeout must be greater than 0 when set");
        }

        if self.queue_retry_initial_backoff.is_zero() {
            bail!("queue_retry_initial_backoff must be greater than 0");
        }

        if self.queue_retry_max_backoff < self.queue_retry_initial_backoff {
            bail!("queue_retry_max_backoff must be at least queue_retry_initial_backoff");
        }

        if self.queue_retry_max_attempts == 0 {
            bail!("queue_retry_max_attempts must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct WorkerConfigBuilder {
    rpc_url: Option<String>,
    endpoint: Option<String>,
    api_token: Option<String>,
    repo: Option<PathBuf>,
    rpc_timeout: Option<Duration>,
    queue_poll_timeout: Option<Duration>,
    step_timeout: Option<Duration>,
    queue_retry_initial_backoff: Option<Duration>,
    queue_retry_max_backoff: Option<Duration>,
    queue_retry_max_attempts: Option<usize>,
    metrics_interval: Option<Duration>,
}

impl WorkerConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn repo(mut self, repo: impl Into<PathBuf>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn queue_poll_timeout(mut self, timeout: Duration) -> Self {
        self.queue_poll_timeout = Some(timeout);
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn queue_retry_initial_backoff(mut self, backoff: Duration) -> Self {
        self.queue_retry_initial_backoff = Some(backoff);
        self
    }

    pub fn queue_retry_max_backoff(mut self, backoff: Duration) -> Self {
        self.queue_retry_max_backoff = Some(backoff);
        self
    }

    pub fn queue_retry_max_attempts(mut self, attempts: usize) -> Self {
        self.queue_retry_max_attempts = Some(attempts);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<WorkerConfig> {
        let params = WorkerConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            endpoint: self.endpoint,
            api_token: self.api_token,
            repo: self.repo.context("repo is required")?,
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            queue_poll_timeout: self
                .queue_poll_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_QUEUE_POLL_TIMEOUT_SECS)),
            step_timeout: self.step_timeout,
            queue_retry_initial_backoff: self.queue_retry_initial_backoff.unwrap_or_else(|| {
                Duration::from_millis(DEFAULT_QUEUE_RETRY_INITIAL_BACKOFF_MS)
            }),
            queue_retry_max_backoff: self
                .queue_retry_max_backoff
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_QUEUE_RETRY_MAX_BACKOFF_SECS)),
            queue_retry_max_attempts: self
                .queue_retry_max_attempts
                .unwrap_or(DEFAULT_QUEUE_RETRY_MAX_ATTEMPTS),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        WorkerConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn validate_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must start with http:// or https://");
    }
    Ok(())
}

/// Object store defaults to the RPC server's origin, e.g.
/// `http://host:2345/rpc/v0` serves objects under `http://host:2345/remote/...`.
fn derive_endpoint(rpc_url: &str) -> Result<String> {
    let uri: Uri = rpc_url
        .parse()
        .with_context(|| format!("rpc_url '{rpc_url}' is not a valid URI"))?;
    let scheme = uri.scheme_str().context("rpc_url is missing a scheme")?;
    let authority = uri.authority().context("rpc_url is missing a host")?;
    Ok(format!("{scheme}://{authority}"))
}
