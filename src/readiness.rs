//! Waiting for a freshly created or updated resource to become reachable.
//!
//! [`ReadinessWaiter`] repeatedly probes a URL until it answers HTTP 200, the
//! deadline passes, or the caller cancels. Probing is behind the
//! [`HealthProbe`] trait so tests can script the remote side and run against
//! tokio's paused clock.
//!
//! ```text
//! Polling --200--> Ready
//!    |  \--deadline--> TimedOut
//!    |   \--bad URL / request build error--> Failed
//!    \--cancel--> Cancelled
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default overall deadline for a readiness wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline used when the configured timeout overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Timing of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    /// Fixed deadline measured from the start of the wait.
    pub timeout: Duration,
    /// Delay after the first failed probe.
    pub initial_interval: Duration,
    /// Upper bound for the doubling delay.
    pub max_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

impl ReadinessConfig {
    /// Use a different overall deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Where a readiness wait stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// Probing; the target has not answered 200 yet.
    Polling,
    /// The target answered 200.
    Ready,
    /// The deadline passed without a 200.
    TimedOut,
    /// A local, non-retryable error ended the wait.
    Failed(String),
    /// The caller gave up.
    Cancelled,
}

impl ReadinessState {
    /// Whether the wait is over.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Polling)
    }
}

/// Why a readiness wait did not end in [`ReadinessState::Ready`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    /// The deadline passed.
    #[error("{url} was not ready after {timeout:?}: {last}")]
    TimedOut {
        /// Probed URL.
        url: String,
        /// The deadline that elapsed.
        timeout: Duration,
        /// Outcome of the last probe.
        last: String,
    },

    /// A non-retryable local error.
    #[error("cannot probe {url}: {reason}")]
    Failed {
        /// Probed URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The wait was cancelled.
    #[error("readiness wait for {url} was cancelled")]
    Cancelled {
        /// Probed URL.
        url: String,
    },
}

impl ReadinessError {
    /// The terminal state this error represents.
    pub fn state(&self) -> ReadinessState {
        match self {
            Self::TimedOut { .. } => ReadinessState::TimedOut,
            Self::Failed { reason, .. } => ReadinessState::Failed(reason.clone()),
            Self::Cancelled { .. } => ReadinessState::Cancelled,
        }
    }
}

/// Result of a single probe that reached a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The target answered 200.
    Ready,
    /// Not yet; the string describes what was observed.
    NotReady(String),
}

/// A probe that could not even be attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The request could not be constructed.
    #[error("cannot build probe request: {0}")]
    Request(String),
}

/// Checks whether a URL is serving.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `url` once.
    ///
    /// Transient failures (connection refused, 5xx) are `Ok(NotReady)`;
    /// `Err` ends the wait.
    async fn probe(&self, url: &Url) -> Result<ProbeOutcome, ProbeError>;
}

/// [`HealthProbe`] sending `HEAD` requests.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe with its own connection pool.
    pub fn new() -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &Url) -> Result<ProbeOutcome, ProbeError> {
        match self.http.head(url.clone()).send().await {
            Ok(response) if response.status() == StatusCode::OK => Ok(ProbeOutcome::Ready),
            Ok(response) => Ok(ProbeOutcome::NotReady(format!(
                "status {}",
                response.status()
            ))),
            Err(e) if e.is_builder() => Err(ProbeError::Request(e.to_string())),
            Err(e) => Ok(ProbeOutcome::NotReady(e.to_string())),
        }
    }
}

/// Polls a [`HealthProbe`] with exponential backoff until ready.
#[derive(Clone)]
pub struct ReadinessWaiter {
    probe: Arc<dyn HealthProbe>,
    config: ReadinessConfig,
}

impl std::fmt::Debug for ReadinessWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessWaiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReadinessWaiter {
    /// Create a waiter.
    pub fn new(probe: Arc<dyn HealthProbe>, config: ReadinessConfig) -> Self {
        Self { probe, config }
    }

    /// The timing in use.
    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Probe `url` until it answers 200.
    ///
    /// Returns how long the wait took. The delay between probes starts at
    /// `initial_interval`, doubles up to `max_interval`, and never runs past
    /// the deadline.
    pub async fn wait(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Duration, ReadinessError> {
        let target = Url::parse(url).map_err(|e| ReadinessError::Failed {
            url: url.to_string(),
            reason: format!("invalid URL: {}", e),
        })?;

        let start = Instant::now();
        let deadline = start
            .checked_add(self.config.timeout)
            .unwrap_or_else(|| start + FAR_FUTURE);
        let mut interval = self.config.initial_interval;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let probed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ReadinessError::Cancelled { url: url.to_string() });
                },
                probed = tokio::time::timeout_at(deadline, self.probe.probe(&target)) => probed,
            };

            let last = match probed {
                Ok(Ok(ProbeOutcome::Ready)) => {
                    let elapsed = start.elapsed();
                    info!(%url, attempts, ?elapsed, "Resource is ready");
                    return Ok(elapsed);
                },
                Ok(Ok(ProbeOutcome::NotReady(reason))) => reason,
                Ok(Err(e)) => {
                    return Err(ReadinessError::Failed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                },
                Err(_) => "probe did not finish before the deadline".to_string(),
            };

            let now = Instant::now();
            if now >= deadline {
                warn!(%url, attempts, last = %last, "Gave up waiting for resource");
                return Err(ReadinessError::TimedOut {
                    url: url.to_string(),
                    timeout: self.config.timeout,
                    last,
                });
            }

            let delay = interval.min(deadline - now);
            debug!(%url, attempts, last = %last, ?delay, "Resource not ready yet");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ReadinessError::Cancelled { url: url.to_string() });
                },
                _ = tokio::time::sleep(delay) => {},
            }
            interval = (interval * 2).min(self.config.max_interval);
        }
    }
}
