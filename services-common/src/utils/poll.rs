//! Cancellable polling for things that appear asynchronously: injected wallet
//! providers, transaction receipts, signature statuses.

use serde::Deserialize;
use std::{convert::Infallible, future::Future, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Clone, Debug, Deserialize, serde_derive_default::Default)]
pub struct PollConfig {
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

fn default_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError<E = Infallible> {
    #[error("polling timed out after {0:?}")]
    Timeout(Duration),
    #[error("polling gave up after {0} attempts")]
    Exhausted(u32),
    #[error("polling was cancelled")]
    Cancelled,
    #[error("probe failed: {0}")]
    Probe(E),
}

impl PollError {
    /// Widens a poll error produced by an infallible probe.
    pub fn widen<E>(self) -> PollError<E> {
        match self {
            PollError::Timeout(elapsed) => PollError::Timeout(elapsed),
            PollError::Exhausted(attempts) => PollError::Exhausted(attempts),
            PollError::Cancelled => PollError::Cancelled,
            PollError::Probe(never) => match never {},
        }
    }
}

/// Handle which stops a running [`Poller`] from another task.
#[derive(Clone, Debug)]
pub struct AbortHandle(CancellationToken);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.0.is_cancelled()
    }
}

#[derive(Clone, Debug)]
pub struct Poller {
    config: PollConfig,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.cancel.clone())
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Polls until probe yields a value.
    pub async fn until<T, F, Fut>(&self, mut probe: F) -> Result<T, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        self.try_until(|| {
            let fut = probe();
            async move { Ok::<_, Infallible>(fut.await) }
        })
        .await
    }

    /// Polls until probe yields a value, stopping early on the first probe error.
    pub async fn try_until<T, E, F, Fut>(&self, mut probe: F) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let deadline = Instant::now() + self.config.timeout;
        let mut attempts = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            attempts += 1;
            if let Some(value) = probe().await.map_err(PollError::Probe)? {
                return Ok(value);
            }
            trace!("poll attempt {attempts} yielded nothing");
            if let Some(max_attempts) = self.config.max_attempts {
                if attempts >= max_attempts {
                    return Err(PollError::Exhausted(max_attempts));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PollError::Timeout(self.config.timeout));
            }
            let nap = self.config.interval.min(deadline - now);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}
