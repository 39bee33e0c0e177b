//! Bounded exponential backoff and shutdown-aware waiting.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, warn};

use berth_core::config::RetryPolicy;

use crate::error::{SyncError, SyncResult};

/// Tracks consecutive failures of one operation.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    /// Consecutive failed attempts.
    attempts: u32,
    /// Delay before the next attempt.
    current: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            current: policy.initial_backoff,
        }
    }

    /// Record a failure. Returns the delay before the next attempt, or
    /// `None` once `max_attempts` attempts have failed.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.current;
        // Exponential backoff: double the interval up to max.
        self.current = (self.current * 2).min(self.policy.max_backoff);
        Some(delay)
    }

    /// Forget previous failures after a success.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.policy.initial_backoff;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Run `fut` unless shutdown is (or becomes) requested first.
pub async fn until_shutdown<F: Future>(
    fut: F,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<F::Output> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        out = fut => Some(out),
        _ = shutdown.changed() => None,
    }
}

/// Sleep for `duration`. Returns `false` if shutdown interrupted the sleep.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    until_shutdown(tokio::time::sleep(duration), shutdown)
        .await
        .is_some()
}

/// Run `op` until it succeeds, backing off between failures.
///
/// Returns `Ok(None)` if shutdown was requested, and
/// [`SyncError::RetriesExhausted`] once the policy gives up.
pub async fn retry<T, F, Fut>(
    operation: &'static str,
    policy: RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut op: F,
) -> SyncResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let mut backoff = Backoff::new(policy);
    loop {
        let err = match until_shutdown(op(), shutdown).await {
            None => return Ok(None),
            Some(Ok(value)) => return Ok(Some(value)),
            Some(Err(e)) => e,
        };

        let Some(delay) = backoff.next_delay() else {
            error!(operation, attempts = backoff.attempts(), error = %err, "retries exhausted");
            return Err(SyncError::RetriesExhausted {
                operation,
                attempts: backoff.attempts(),
                last_error: err.to_string(),
            });
        };

        warn!(
            operation,
            attempt = backoff.attempts(),
            retry_in = ?delay,
            error = %err,
            "operation failed, retrying"
        );
        if !sleep_or_shutdown(delay, shutdown).await {
            return Ok(None);
        }
    }
}
