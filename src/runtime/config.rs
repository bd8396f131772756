use crate::runtime::contracts::ChainContext;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_EMPTY_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_ERROR_BACKOFF_MS: u64 = 100;
const DEFAULT_CHECKPOINT_RETRY_MAX_BACKOFF_MS: u64 = 2_000;

/// Runtime configuration for the verification watcher.
///
/// All instances must be constructed via [`WatcherConfig::builder`] or
/// [`WatcherConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    environment: String,
    deployment: String,
    node_url: String,
    empty_poll_interval: Duration,
    error_backoff: Duration,
    checkpoint_retry_max_backoff: Duration,
    metrics_interval: Duration,
    verify_pointer: bool,
}

pub struct WatcherConfigParams {
    pub environment: String,
    pub deployment: String,
    pub node_url: String,
    pub empty_poll_interval: Duration,
    pub error_backoff: Duration,
    pub checkpoint_retry_max_backoff: Duration,
    pub metrics_interval: Duration,
    pub verify_pointer: bool,
}

impl WatcherConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> WatcherConfigBuilder {
        WatcherConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`WatcherConfig::builder`] for ergonomics when many values use
    /// defaults.
    pub fn new(params: WatcherConfigParams) -> Result<Self> {
        let WatcherConfigParams {
            environment,
            deployment,
            node_url,
            empty_poll_interval,
            error_backoff,
            checkpoint_retry_max_backoff,
            metrics_interval,
            verify_pointer,
        } = params;

        let config = Self {
            environment: trimmed_string(environment),
            deployment: trimmed_string(deployment),
            node_url: trimmed_string(node_url),
            empty_poll_interval,
            error_backoff,
            checkpoint_retry_max_backoff,
            metrics_interval,
            verify_pointer,
        };

        config.validate()?;
        Ok(config)
    }

    /// Feed environment the watcher polls (e.g. the network name).
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Feed deployment identifier within the environment.
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// Chain node URL handed to the verifier.
    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    /// Sleep applied when a feed page comes back empty.
    pub fn empty_poll_interval(&self) -> Duration {
        self.empty_poll_interval
    }

    /// Sleep applied after a transient fetch or processing error.
    pub fn error_backoff(&self) -> Duration {
        self.error_backoff
    }

    /// Backoff cap for checkpoint-persistence retries.
    pub fn checkpoint_retry_max_backoff(&self) -> Duration {
        self.checkpoint_retry_max_backoff
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Whether the verifier is asked to run pointer-style cross-checks.
    pub fn verify_pointer(&self) -> bool {
        self.verify_pointer
    }

    /// The network/chain descriptor handed to the verifier with every item.
    pub fn chain_context(&self) -> ChainContext {
        ChainContext {
            environment: self.environment.clone(),
            deployment: self.deployment.clone(),
            node_url: self.node_url.clone(),
        }
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        ensure_not_empty(&self.environment, "environment")?;
        ensure_not_empty(&self.deployment, "deployment")?;
        validate_url(&self.node_url)?;

        if self.empty_poll_interval.is_zero() {
            bail!("empty_poll_interval must be greater than 0");
        }

        if self.error_backoff.is_zero() {
            bail!("error_backoff must be greater than 0");
        }

        if self.checkpoint_retry_max_backoff < self.error_backoff {
            bail!("checkpoint_retry_max_backoff must be at least error_backoff");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct WatcherConfigBuilder {
    environment: Option<String>,
    deployment: Option<String>,
    node_url: Option<String>,
    empty_poll_interval: Option<Duration>,
    error_backoff: Option<Duration>,
    checkpoint_retry_max_backoff: Option<Duration>,
    metrics_interval: Option<Duration>,
    verify_pointer: Option<bool>,
}

impl WatcherConfigBuilder {
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    pub fn node_url(mut self, url: impl Into<String>) -> Self {
        self.node_url = Some(url.into());
        self
    }

    pub fn empty_poll_interval(mut self, interval: Duration) -> Self {
        self.empty_poll_interval = Some(interval);
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = Some(backoff);
        self
    }

    pub fn checkpoint_retry_max_backoff(mut self, backoff: Duration) -> Self {
        self.checkpoint_retry_max_backoff = Some(backoff);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn verify_pointer(mut self, enabled: bool) -> Self {
        self.verify_pointer = Some(enabled);
        self
    }

    pub fn build(self) -> Result<WatcherConfig> {
        let params = WatcherConfigParams {
            environment: self.environment.context("environment is required")?,
            deployment: self.deployment.context("deployment is required")?,
            node_url: self.node_url.context("node_url is required")?,
            empty_poll_interval: self
                .empty_poll_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_EMPTY_POLL_INTERVAL_MS)),
            error_backoff: self
                .error_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_ERROR_BACKOFF_MS)),
            checkpoint_retry_max_backoff: self
                .checkpoint_retry_max_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_CHECKPOINT_RETRY_MAX_BACKOFF_MS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            verify_pointer: self.verify_pointer.unwrap_or(true),
        };

        WatcherConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("node_url must start with http:// or https://");
    }
    Ok(())
}
