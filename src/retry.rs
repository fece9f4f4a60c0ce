/*!
 * Retry policy and cancellable waits.
 *
 * `RetryPolicy` is a pure description of how long to wait between attempts,
 * `RetryState` tracks a single logical operation (a login, a page fetch,
 * a unit write), and `CancelToken` lets every wait be interrupted.
 */

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::app_config::RetryConfig;

/// Returned when a wait was interrupted by cancellation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Linear backoff policy shared by login, page fetches and unit writes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay unit; the wait after attempt `n` is `base_delay * (n + 1)`
    pub base_delay: Duration,
    /// Upper bound applied to server-supplied wait hints
    pub max_wait: Duration,
    /// Attempt ceiling for a single operation
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Create a new policy
    pub fn new(base_delay: Duration, max_wait: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_wait,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Build the policy from the retry section of the configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_secs(config.max_wait_secs),
            config.max_attempts,
        )
    }

    /// Delay before the next attempt.
    ///
    /// A server hint always wins; without one the delay grows linearly with
    /// the attempt number. Either way the result never exceeds `max_wait`.
    pub fn next_delay(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        let delay = match server_hint {
            Some(hint) => hint,
            None => self.base_delay.saturating_mul(attempt.saturating_add(1)),
        };
        delay.min(self.max_wait)
    }

    /// Convert a "retry not before" unix timestamp into a wait hint
    pub fn hint_until(wait_until_unix: i64, now_unix: i64) -> Duration {
        Duration::from_secs(wait_until_unix.saturating_sub(now_unix).max(0) as u64)
    }

    /// Whether another attempt is allowed after `attempts_made`
    pub fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Bookkeeping for one logical operation
#[derive(Debug, Clone)]
pub struct RetryState {
    operation: String,
    attempts: u32,
    last_wait: Option<Duration>,
    not_before: Option<Instant>,
}

impl RetryState {
    /// Start tracking a new operation
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attempts: 0,
            last_wait: None,
            not_before: None,
        }
    }

    /// Name of the operation, used in diagnostics
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Duration of the most recent wait
    pub fn last_wait(&self) -> Option<Duration> {
        self.last_wait
    }

    /// Instant before which the next attempt must not start
    pub fn not_before(&self) -> Option<Instant> {
        self.not_before
    }

    /// Count a new attempt and return its 1-based number
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Whether the attempt ceiling has been reached
    pub fn exhausted(&self, policy: &RetryPolicy) -> bool {
        !policy.allows(self.attempts)
    }

    /// Wait before the next attempt, honouring an optional server hint
    pub async fn backoff(
        &mut self,
        policy: &RetryPolicy,
        server_hint: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<Duration, Cancelled> {
        // zero-based index of the attempt that just failed
        let delay = policy.next_delay(self.attempts.saturating_sub(1), server_hint);
        self.pause(delay, cancel).await?;
        Ok(delay)
    }

    /// Wait for `delay` without affecting the attempt count
    pub async fn pause(&mut self, delay: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.last_wait = Some(delay);
        self.not_before = Some(Instant::now() + delay);
        if !delay.is_zero() {
            debug!("{}: waiting {:?} before next attempt", self.operation, delay);
        }
        cancel.sleep(delay).await
    }
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation signal shared between the engine and its owner
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every pending wait
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration` unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(Cancelled),
        }
    }
}
