//! Retry with exponential backoff for opening source streams
//!
//! Only the request that opens a download's byte stream is retried. Once
//! bytes are flowing, a failure ends the run and the task can be resumed.
//!
//! ```no_run
//! use resumable_dl::config::RetryConfig;
//! use resumable_dl::retry::download_with_retry;
//! use resumable_dl::error::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let body = download_with_retry(&config, || async {
//!     Ok::<_, Error>("opened".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

/// Classifies errors as transient (worth another attempt) or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| is_retryable_status(s.as_u16()))
            }
            Error::Transport { status, .. } => is_retryable_status(*status),
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::BrokenPipe
                    | ErrorKind::Interrupted
                    | ErrorKind::UnexpectedEof
            ),
            Error::Execution(cause) => cause.is_retryable(),
            Error::InvalidUrl(_)
            | Error::Storage(_)
            | Error::Record(_)
            | Error::Serialization(_)
            | Error::TaskActive { .. }
            | Error::NotFound(_)
            | Error::ShuttingDown
            | Error::ResultTaken(_)
            | Error::Cancelled
            | Error::Timeout
            | Error::Config { .. } => false,
        }
    }
}

/// Request timeout, rate limiting and server-side failures
fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
///
/// `config.max_attempts` counts retries after the first call, so the
/// operation runs at most `max_attempts + 1` times. The error of the last
/// attempt is returned.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(attempts = retries + 1, "source opened after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::debug!(error = %err, "permanent failure, not retrying");
            return Err(err);
        }
        if retries >= config.max_attempts {
            tracing::error!(error = %err, attempts = retries + 1, "giving up after retries");
            return Err(err);
        }

        let delay = backoff_delay(config, retries);
        retries += 1;
        tracing::warn!(
            error = %err,
            attempt = retries,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Delay before retry number `retry` (0-based)
///
/// `initial_delay * backoff_multiplier^retry`, capped at `max_delay`, then
/// stretched by up to 100% when jitter is enabled.
pub fn backoff_delay(config: &RetryConfig, retry: u32) -> Duration {
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let base = if secs.is_finite() {
        Duration::from_secs_f64(secs.min(config.max_delay.as_secs_f64()))
    } else {
        config.max_delay
    };

    if config.jitter { add_jitter(base) } else { base }
}

fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    delay.mul_f64(1.0 + factor)
}
