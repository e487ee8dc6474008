//! Condition-polling wait engine.
//!
//! Every other component is built on [`Waiter`]: a probe is evaluated against
//! live browser state until it reports [`Check::Ready`] or the [`Deadline`]
//! passes. Errors from the probe count as "not yet" unless they are fatal, so
//! a DOM mutating under a query never aborts a wait early while a malformed
//! selector never gets retried forever.
//!
//! Time comes from `tokio::time`, so tests running on a paused runtime see
//! exact, deterministic elapsed values.

use crate::result::{HarnessError, HarnessResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (200ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

// =============================================================================
// DEADLINE
// =============================================================================

/// Absolute expiry time derived from a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + timeout,
        }
    }

    /// The instant at which the deadline expires
    #[must_use]
    pub const fn at(&self) -> Instant {
        self.at
    }

    /// The timeout this deadline was created from
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.at - self.started
    }

    /// Time since the deadline was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before expiry (zero once expired)
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Caller-supplied classifier for errors that must abort a wait
pub type FatalClassifier = fn(&HarnessError) -> bool;

/// Options for wait operations
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Extra fatal error kinds on top of [`HarnessError::is_fatal`]
    pub fatal: Option<FatalClassifier>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fatal: None,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Treat errors matching `classifier` as fatal
    #[must_use]
    pub const fn with_fatal(mut self, classifier: FatalClassifier) -> Self {
        self.fatal = Some(classifier);
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Whole milliseconds in `duration`, rounded up
///
/// A nonzero sub-millisecond duration becomes 1 ms rather than 0, which a
/// poll interval would otherwise reject.
pub(crate) fn millis_ceil(duration: Duration) -> u64 {
    let millis = duration.as_millis() + u128::from(duration.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

// =============================================================================
// CHECK
// =============================================================================

/// Outcome of a single probe evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check<T> {
    /// Condition met
    Ready(T),
    /// Not yet; carries a description of what was observed
    Pending(String),
}

impl<T> Check<T> {
    /// Not yet, with an observation for diagnostics
    #[must_use]
    pub fn pending(observed: impl Into<String>) -> Self {
        Self::Pending(observed.into())
    }

    /// Whether the condition was met
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl Check<()> {
    /// Ready when `condition` holds, otherwise pending with `observed`
    #[must_use]
    pub fn when(condition: bool, observed: impl Into<String>) -> Self {
        if condition {
            Self::Ready(())
        } else {
            Self::Pending(observed.into())
        }
    }
}

// =============================================================================
// WAITER
// =============================================================================

/// Stateless polling engine
#[derive(Debug, Clone, Copy, Default)]
pub struct Waiter {
    options: WaitOptions,
}

impl Waiter {
    /// Create a new waiter with default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom options
    #[must_use]
    pub const fn with_options(options: WaitOptions) -> Self {
        Self { options }
    }

    /// Get the options
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Whether `err` must abort a wait
    #[must_use]
    pub fn is_fatal(&self, err: &HarnessError) -> bool {
        err.is_fatal() || self.options.fatal.is_some_and(|classify| classify(err))
    }

    /// Poll `probe` until ready, bounded by the configured timeout
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Timeout`] once the deadline passes, or the
    /// probe's error as soon as it is fatal.
    pub async fn until<T, F, Fut>(&self, waited_for: &str, probe: F) -> HarnessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarnessResult<Check<T>>>,
    {
        let deadline = Deadline::after(self.options.timeout());
        self.until_deadline(&deadline, waited_for, probe).await
    }

    /// Poll `probe` until ready, bounded by an existing deadline
    ///
    /// The probe always runs at least once, even on an expired deadline. Sleeps
    /// are capped at the time remaining so the last attempt lands on the
    /// deadline itself.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Timeout`] once the deadline passes, or the
    /// probe's error as soon as it is fatal.
    pub async fn until_deadline<T, F, Fut>(
        &self,
        deadline: &Deadline,
        waited_for: &str,
        mut probe: F,
    ) -> HarnessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarnessResult<Check<T>>>,
    {
        let poll_interval = self.options.poll_interval();
        if poll_interval.is_zero() {
            return Err(HarnessError::invalid_config(
                "poll interval must be greater than zero",
            ));
        }

        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let last_observed = match probe().await {
                Ok(Check::Ready(value)) => {
                    tracing::trace!(waited_for, attempts, "wait satisfied");
                    return Ok(value);
                }
                Ok(Check::Pending(observed)) => observed,
                Err(err) if self.is_fatal(&err) => {
                    tracing::debug!(waited_for, attempts, error = %err, "fatal error aborts wait");
                    return Err(err);
                }
                Err(err) => {
                    tracing::trace!(waited_for, attempts, error = %err, "probe failed, retrying");
                    err.to_string()
                }
            };

            let remaining = deadline.remaining();
            if remaining.is_zero() {
                let elapsed = deadline.elapsed();
                tracing::warn!(
                    waited_for,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "wait timed out"
                );
                return Err(HarnessError::Timeout {
                    waited_for: waited_for.to_string(),
                    elapsed,
                    last_observed: Some(last_observed),
                });
            }
            sleep(poll_interval.min(remaining)).await;
        }
    }
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Poll `probe` every `poll_interval` until ready or `timeout` elapses
///
/// # Errors
///
/// See [`Waiter::until`].
pub async fn wait_until<T, F, Fut>(
    probe: F,
    timeout: Duration,
    poll_interval: Duration,
) -> HarnessResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<Check<T>>>,
{
    let options = WaitOptions::new()
        .with_timeout(millis_ceil(timeout))
        .with_poll_interval(millis_ceil(poll_interval));
    Waiter::with_options(options)
        .until("condition", probe)
        .await
}

// =============================================================================
// TESTS
// =============================================================================
