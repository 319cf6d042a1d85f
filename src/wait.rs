//! Bounded polling and fixed-backoff retry for control-plane round trips.
//!
//! Both loops take their durations from a config value so callers can run
//! them against a real cluster with minute-scale bounds and in tests with
//! millisecond ones.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{error, warn};

/// A wait that ran out of wall clock before its condition held.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {after:?} waiting for {what}")]
pub struct TimedOut {
    pub what: String,
    pub after: Duration,
}

/// Cadence and cap for one polling wait.
#[derive(Clone, Debug)]
pub struct WaitConfig {
    /// Wall-clock cap on the whole wait.
    pub bound: Duration,
    /// Pause between probes.
    pub interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> WaitConfig {
        WaitConfig {
            bound: Duration::from_secs(300),
            interval: Duration::from_secs(1),
        }
    }
}

/// Polls `probe` until it reports true, sleeping `config.interval` between
/// probes and giving up once `config.bound` has elapsed.
///
/// The probe always runs at least once. A probe error ends the wait
/// immediately; only a false answer is waited out.
pub async fn until<F, Fut, E>(config: &WaitConfig, what: &str, mut probe: F) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: From<TimedOut>,
{
    let started = Instant::now();
    loop {
        if probe().await? {
            return Ok(());
        }
        if started.elapsed() >= config.bound {
            error!(what, bound = ?config.bound, "giving up");
            return Err(TimedOut {
                what: what.to_string(),
                after: config.bound,
            }
            .into());
        }
        tokio::time::sleep(config.interval).await;
    }
}

/// Attempt budget and pause for one retried operation.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, the first try included.
    pub attempts: u32,
    /// Fixed pause before the next attempt.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> RetryConfig {
        RetryConfig {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Runs `operation` until it succeeds or `config.attempts` are spent.
/// Every failure is logged with its attempt count; the last error is
/// returned once the budget is exhausted.
pub async fn retrying<F, Fut, T, E>(
    config: &RetryConfig,
    what: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.attempts => {
                warn!(what, attempt, error = %err, "attempt failed, backing off");
                tokio::time::sleep(config.backoff).await;
            }
            Err(err) => {
                error!(what, attempt, error = %err, "giving up");
                return Err(err);
            }
        }
    }
}
