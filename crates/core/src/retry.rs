//! Capped retry with backoff for transient host failures.
//!
//! [`retry_transient`] wraps a single remote call; [`RetryingGateway`]
//! applies it to job submission.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::host::{AccessToken, HostError, JobSubmitter, SubmissionGateway};
use crate::metrics;
use crate::pipeline::Stage;

/// How the delay grows between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = initial * multiplier^(retry - 1)
    #[default]
    Exponential,
    /// delay = initial * retry
    Linear,
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt. Total attempts = max_retries + 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Growth factor for exponential backoff.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    8000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff: BackoffStrategy::default(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_delay_ms = initial_ms;
        self.max_delay_ms = max_ms;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the given retry (1-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let initial = self.initial_delay_ms as f64;
        let raw = match self.backoff {
            BackoffStrategy::Exponential => initial * self.multiplier.powi(retry as i32 - 1),
            BackoffStrategy::Linear => initial * f64::from(retry),
        };
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Run `call` until it succeeds, fails with a non-transient error, or the
/// retry budget is spent. The last error is returned unchanged.
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T, HostError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HostError>>,
{
    let mut retries = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retries < config.max_retries => {
                retries += 1;
                let delay = config.delay_for(retries);
                metrics::RETRY_ATTEMPTS
                    .with_label_values(&[operation])
                    .inc();
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    operation, e, retries, config.max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Submission gateway that retries transient submit failures.
pub struct RetryingGateway<J> {
    submitter: J,
    config: RetryConfig,
}

impl<J: JobSubmitter> RetryingGateway<J> {
    pub fn new(submitter: J, config: RetryConfig) -> Self {
        Self { submitter, config }
    }
}

#[async_trait]
impl<J: JobSubmitter> SubmissionGateway for RetryingGateway<J> {
    async fn submit(&self, stage: Stage, project_id: Uuid) -> Result<AccessToken, HostError> {
        let operation = format!("submit_{}", stage);
        retry_transient(&self.config, &operation, || {
            self.submitter.submit_job(stage, project_id)
        })
        .await
    }
}
