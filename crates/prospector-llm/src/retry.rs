//! Per-remote exponential backoff for transient failures.
//!
//! [`RetryPolicy::execute`] runs any async operation returning
//! `Result<T, RemoteError>`, retrying transient errors with exponential
//! backoff and uniform jitter. Terminal errors and exhaustion propagate
//! the error unchanged; the orchestrator decides logging and audit.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{RemoteError, Result};

/// Which remote an operation talks to. Selects the backoff schedule and
/// labels log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Llm,
    Forum,
    Storefront,
}

impl RemoteKind {
    /// Name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteKind::Llm => "llm",
            RemoteKind::Forum => "forum",
            RemoteKind::Storefront => "storefront",
        }
    }
}

impl std::fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backoff schedule for one remote.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per subsequent retry.
    pub multiplier: u32,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Ceiling on any single delay (before jitter).
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to every sleep.
    pub jitter: Duration,
}

impl BackoffConfig {
    /// Schedule for the LLM remote: 2s base, x2, 4 attempts, 60s cap.
    pub fn llm() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2,
            max_attempts: 4,
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_secs(1),
        }
    }

    /// Schedule for the forum remote: 3s base, x2, 3 attempts, 30s cap.
    pub fn forum() -> Self {
        Self {
            base_delay: Duration::from_secs(3),
            multiplier: 2,
            max_attempts: 3,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }

    /// Schedule for the storefront remote: 2s base, x2, 3 attempts, 30s cap.
    pub fn storefront() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2,
            max_attempts: 3,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }

    /// Schedule for the given remote.
    pub fn for_remote(remote: RemoteKind) -> Self {
        match remote {
            RemoteKind::Llm => Self::llm(),
            RemoteKind::Forum => Self::forum(),
            RemoteKind::Storefront => Self::storefront(),
        }
    }
}

/// Delay before retry number `retry` (0-indexed): `base * mult^retry`
/// capped at `max_delay`, plus uniform jitter in `[0, jitter]`.
pub fn compute_delay(config: &BackoffConfig, retry: u32) -> Duration {
    let exp = (config.multiplier as u64).saturating_pow(retry);
    let base_ms = config.base_delay.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(exp);
    let capped_ms = raw_ms.min(config.max_delay.as_millis() as u64);

    // Pseudo-random jitter seeded from the clock's sub-second nanos.
    let jitter_max_ms = config.jitter.as_millis() as u64;
    let jitter_ms = if jitter_max_ms > 0 {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        seed % (jitter_max_ms + 1)
    } else {
        0
    };

    Duration::from_millis(capped_ms + jitter_ms)
}

/// Executes remote operations with per-remote backoff schedules.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Override applied to every remote, used by tests to avoid real
    /// sleeps. `None` means the per-remote schedule.
    override_config: Option<BackoffConfig>,
}

impl RetryPolicy {
    /// Policy using the per-remote production schedules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy using one schedule for every remote (test use).
    pub fn with_config(config: BackoffConfig) -> Self {
        Self {
            override_config: Some(config),
        }
    }

    fn config_for(&self, remote: RemoteKind) -> BackoffConfig {
        self.override_config
            .clone()
            .unwrap_or_else(|| BackoffConfig::for_remote(remote))
    }

    /// Run `op`, retrying transient failures per the remote's schedule.
    ///
    /// Terminal errors return immediately after a single call. On
    /// exhaustion the last error is propagated unchanged.
    pub async fn execute<T, F, Fut>(&self, remote: RemoteKind, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = self.config_for(remote);
        let mut last_err = None;

        for attempt in 1..=config.max_attempts {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(remote = %remote, attempt, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !err.is_transient() || attempt == config.max_attempts {
                        return Err(err);
                    }

                    // Honor a provider-suggested retry-after when it is
                    // longer than the computed delay.
                    let delay = if let RemoteError::RateLimited { retry_after_ms } = &err {
                        compute_delay(&config, attempt - 1)
                            .max(Duration::from_millis(*retry_after_ms))
                    } else {
                        compute_delay(&config, attempt - 1)
                    };

                    warn!(
                        remote = %remote,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RemoteError::RequestFailed("retry loop exhausted".into())))
    }
}
