//! Browsing-context lifecycle around a navigation trigger.
//!
//! A trigger such as clicking a link may open a new context or navigate the
//! current one in place. [`WindowManager::navigate_and_verify`] turns that
//! uncertainty into an explicit [`NavigationOutcome`] and guarantees the
//! session is put back the way it was found, whatever happens in between.
//!
//! ```text
//! Idle ─► Armed ─► Detecting ─┬─► Switched ─┬─► Verifying ─► Restoring
//!                             └─► Stayed ───┘                    ▲
//!          (any error or panic after Armed) ─────────────────────┘
//! ```

use crate::driver::{Browser, ContextHandle};
use crate::location::{is_blank, CompiledPattern, LocationPattern};
use crate::result::{HarnessError, HarnessResult};
use crate::wait::{
    millis_ceil, Check, Deadline, WaitOptions, Waiter, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_WAIT_TIMEOUT_MS,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Default budget for restoring the session (5 seconds)
pub const DEFAULT_RESTORE_TIMEOUT_MS: u64 = 5_000;

/// What a trigger turned out to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationOutcome {
    /// A context appeared and is now active
    NewContext {
        /// The new context
        handle: ContextHandle,
        /// Its location after settling
        location: String,
    },
    /// The original context navigated in place
    SameContext {
        /// The new location
        location: String,
    },
}

impl NavigationOutcome {
    /// Location reached by the navigation
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::NewContext { location, .. } | Self::SameContext { location } => location,
        }
    }

    /// Whether a new context was opened
    #[must_use]
    pub const fn opened_new_context(&self) -> bool {
        matches!(self, Self::NewContext { .. })
    }
}

/// How to undo an in-place navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameContextRestore {
    /// Use the context's history
    NavigateBack,
    /// Load the original location again
    Renavigate,
    /// Leave the context where it ended up
    Stay,
}

/// Lifecycle phase, reported through tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Snapshot taken, trigger not fired yet
    Armed,
    /// Waiting for a new context or a location change
    Detecting,
    /// Active context moved to the new one
    Switched,
    /// Navigation happened in place
    Stayed,
    /// Caller assertion running
    Verifying,
    /// Putting the session back
    Restoring,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Armed => "armed",
            Self::Detecting => "detecting",
            Self::Switched => "switched",
            Self::Stayed => "stayed",
            Self::Verifying => "verifying",
            Self::Restoring => "restoring",
        })
    }
}

/// Options for one navigation
///
/// There is no `Default`: the same-context policy must be chosen per call.
#[derive(Debug, Clone, Copy)]
pub struct NavigationOptions {
    /// Budget for detection, settling and the location assertion
    pub timeout: Duration,
    /// Polling interval
    pub poll_interval: Duration,
    /// Separate budget for restoration
    pub restore_timeout: Duration,
    /// Wait for a new context to leave about:blank before verifying
    pub settle_blank: bool,
    /// Undo policy for in-place navigation
    pub same_context: SameContextRestore,
}

impl NavigationOptions {
    /// Default timings with the given same-context policy
    #[must_use]
    pub const fn new(same_context: SameContextRestore) -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            restore_timeout: Duration::from_millis(DEFAULT_RESTORE_TIMEOUT_MS),
            settle_blank: true,
            same_context,
        }
    }

    /// Set the navigation timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the restoration budget
    #[must_use]
    pub const fn with_restore_timeout(mut self, restore_timeout: Duration) -> Self {
        self.restore_timeout = restore_timeout;
        self
    }

    /// Enable or disable settling on about:blank
    #[must_use]
    pub const fn with_settle_blank(mut self, settle_blank: bool) -> Self {
        self.settle_blank = settle_blank;
        self
    }

    fn waiter(&self) -> Waiter {
        Waiter::with_options(
            WaitOptions::new()
                .with_timeout(millis_ceil(self.timeout))
                .with_poll_interval(millis_ceil(self.poll_interval)),
        )
    }
}

/// Session state captured before the trigger fires
#[derive(Debug, Clone)]
struct Snapshot {
    original: ContextHandle,
    contexts: Vec<ContextHandle>,
    location: String,
}

enum Detected {
    NewContext(ContextHandle),
    SameContext(String),
}

/// Runs triggers and restores the session afterwards
#[derive(Debug)]
pub struct WindowManager<'b, B: Browser + ?Sized> {
    browser: &'b B,
}

impl<'b, B: Browser + ?Sized> WindowManager<'b, B> {
    /// Manager over `browser`
    #[must_use]
    pub const fn new(browser: &'b B) -> Self {
        Self { browser }
    }

    /// Fire `trigger`, detect where it navigated, run `verify`, then restore
    ///
    /// Restoration closes every context not present before the trigger,
    /// switches back to the original context and applies
    /// [`NavigationOptions::same_context`] if the original context moved. It
    /// runs after success, after any error and after a panic in `trigger` or
    /// `verify`; a panic is resumed once restoration is done.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::NoNavigationOccurred`] if nothing happened in time
    /// - the error from `trigger` or `verify`, unchanged
    /// - [`HarnessError::Restoration`] if only restoration failed
    pub async fn navigate_and_verify<T, TFut, V, VFut>(
        &self,
        trigger: T,
        options: &NavigationOptions,
        verify: V,
    ) -> HarnessResult<NavigationOutcome>
    where
        T: FnOnce() -> TFut,
        TFut: Future<Output = HarnessResult<()>>,
        V: FnOnce(NavigationOutcome) -> VFut,
        VFut: Future<Output = HarnessResult<()>>,
    {
        let snapshot = self.arm().await?;

        let primary = AssertUnwindSafe(self.run(&snapshot, trigger, options, verify))
            .catch_unwind()
            .await;

        let failures = self.restore(&snapshot, options).await;

        match primary {
            Err(panic) => {
                log_secondary(&failures, "verification panicked");
                resume_unwind(panic)
            }
            Ok(Err(err)) => {
                log_secondary(&failures, "verification failed");
                Err(err)
            }
            Ok(Ok(_)) if !failures.is_empty() => Err(HarnessError::Restoration { failures }),
            Ok(Ok(outcome)) => Ok(outcome),
        }
    }

    /// Fire `trigger` and require the resulting location to match `expected`
    ///
    /// # Errors
    ///
    /// [`HarnessError::InvalidConfig`] before the trigger fires if `expected`
    /// does not compile. Otherwise as
    /// [`navigate_and_verify`](Self::navigate_and_verify); a location that
    /// never matches yields [`HarnessError::AssertionFailed`].
    pub async fn with_external_navigation<T, TFut>(
        &self,
        trigger: T,
        expected: impl Into<LocationPattern>,
        options: &NavigationOptions,
    ) -> HarnessResult<NavigationOutcome>
    where
        T: FnOnce() -> TFut,
        TFut: Future<Output = HarnessResult<()>>,
    {
        let expected = expected.into().compile()?;
        let browser = self.browser;
        let waiter = options.waiter();
        self.navigate_and_verify(trigger, options, move |_| async move {
            assert_location(browser, waiter, &expected).await
        })
        .await
    }

    /// Close every context except `keep`, then make `keep` active
    ///
    /// Returns the number of contexts closed.
    ///
    /// # Errors
    ///
    /// The first close or switch failure.
    pub async fn close_others(&self, keep: &ContextHandle) -> HarnessResult<usize> {
        let mut closed = 0;
        for handle in self.browser.list_contexts().await? {
            if &handle != keep {
                self.browser.close(&handle).await?;
                closed += 1;
            }
        }
        self.browser.switch_to(keep).await?;
        tracing::debug!(handle = %keep, closed, "closed stray contexts");
        Ok(closed)
    }

    async fn arm(&self) -> HarnessResult<Snapshot> {
        let snapshot = Snapshot {
            original: self.browser.active_context().await?,
            contexts: self.browser.list_contexts().await?,
            location: self.browser.current_location().await?,
        };
        tracing::debug!(
            phase = %LifecyclePhase::Armed,
            handle = %snapshot.original,
            contexts = snapshot.contexts.len(),
            location = %snapshot.location,
            "lifecycle"
        );
        Ok(snapshot)
    }

    async fn run<T, TFut, V, VFut>(
        &self,
        snapshot: &Snapshot,
        trigger: T,
        options: &NavigationOptions,
        verify: V,
    ) -> HarnessResult<NavigationOutcome>
    where
        T: FnOnce() -> TFut,
        TFut: Future<Output = HarnessResult<()>>,
        V: FnOnce(NavigationOutcome) -> VFut,
        VFut: Future<Output = HarnessResult<()>>,
    {
        let deadline = Deadline::after(options.timeout);
        trigger().await?;

        tracing::debug!(phase = %LifecyclePhase::Detecting, "lifecycle");
        let outcome = match self.detect(snapshot, options, &deadline).await? {
            Detected::NewContext(handle) => {
                self.browser.switch_to(&handle).await?;
                let location = if options.settle_blank {
                    self.settle(options, &deadline).await?
                } else {
                    self.browser.current_location().await?
                };
                tracing::debug!(
                    phase = %LifecyclePhase::Switched,
                    handle = %handle,
                    location = %location,
                    "lifecycle"
                );
                NavigationOutcome::NewContext { handle, location }
            }
            Detected::SameContext(location) => {
                tracing::debug!(
                    phase = %LifecyclePhase::Stayed,
                    location = %location,
                    "lifecycle"
                );
                NavigationOutcome::SameContext { location }
            }
        };

        tracing::debug!(phase = %LifecyclePhase::Verifying, "lifecycle");
        verify(outcome.clone()).await?;
        Ok(outcome)
    }

    async fn detect(
        &self,
        snapshot: &Snapshot,
        options: &NavigationOptions,
        deadline: &Deadline,
    ) -> HarnessResult<Detected> {
        let browser = self.browser;
        let probe = move || detect_navigation(browser, snapshot);

        match options
            .waiter()
            .until_deadline(deadline, "navigation", probe)
            .await
        {
            Err(HarnessError::Timeout { elapsed, .. }) => {
                let contexts = browser.list_contexts().await.map_or(0, |c| c.len());
                let location = browser.current_location().await.unwrap_or_default();
                Err(HarnessError::NoNavigationOccurred {
                    elapsed,
                    contexts,
                    location,
                })
            }
            other => other,
        }
    }

    /// Location of the active context once it has left about:blank
    async fn settle(&self, options: &NavigationOptions, deadline: &Deadline) -> HarnessResult<String> {
        let browser = self.browser;
        let settled = options
            .waiter()
            .until_deadline(deadline, "context to leave about:blank", move || {
                settled_location(browser)
            })
            .await;

        match settled {
            Err(HarnessError::Timeout { .. }) => browser.current_location().await,
            other => other,
        }
    }

    /// Best-effort restoration; returns every step that failed
    async fn restore(&self, snapshot: &Snapshot, options: &NavigationOptions) -> Vec<String> {
        tracing::debug!(phase = %LifecyclePhase::Restoring, handle = %snapshot.original, "lifecycle");
        let deadline = Deadline::after(options.restore_timeout);
        let mut failures = Vec::new();

        match self.browser.list_contexts().await {
            Ok(contexts) => {
                for handle in contexts.iter().filter(|h| !snapshot.contexts.contains(h)) {
                    if let Err(err) = self.browser.close(handle).await {
                        failures.push(format!("close {handle}: {err}"));
                    }
                }
            }
            Err(err) => failures.push(format!("list contexts: {err}")),
        }

        if let Err(err) = self.browser.switch_to(&snapshot.original).await {
            failures.push(format!("switch to {}: {err}", snapshot.original));
            return failures;
        }

        if let Err(err) = self.restore_location(snapshot, options, &deadline).await {
            failures.push(format!("restore location {}: {err}", snapshot.location));
        }
        failures
    }

    async fn restore_location(
        &self,
        snapshot: &Snapshot,
        options: &NavigationOptions,
        deadline: &Deadline,
    ) -> HarnessResult<()> {
        let current = self.browser.current_location().await?;
        if current == snapshot.location {
            return Ok(());
        }
        match options.same_context {
            SameContextRestore::Stay => return Ok(()),
            SameContextRestore::NavigateBack => self.browser.go_back().await?,
            SameContextRestore::Renavigate => self.browser.navigate(&snapshot.location).await?,
        }

        let browser = self.browser;
        let original = snapshot.location.as_str();
        options
            .waiter()
            .until_deadline(deadline, "original location", move || {
                location_equals(browser, original)
            })
            .await
    }
}

/// Poll until the active location matches `expected`
async fn assert_location<B: Browser + ?Sized>(
    browser: &B,
    waiter: Waiter,
    expected: &CompiledPattern,
) -> HarnessResult<()> {
    let probe = move || location_matches(browser, expected);

    match waiter.until(&format!("location {expected}"), probe).await {
        Err(HarnessError::Timeout { last_observed, .. }) => {
            let actual = match browser.current_location().await {
                Ok(location) => location,
                Err(_) => last_observed.unwrap_or_default(),
            };
            Err(HarnessError::AssertionFailed {
                expected: expected.to_string(),
                actual,
            })
        }
        other => other,
    }
}

async fn detect_navigation<B: Browser + ?Sized>(
    browser: &B,
    snapshot: &Snapshot,
) -> HarnessResult<Check<Detected>> {
    let contexts = browser.list_contexts().await?;
    if let Some(new) = contexts.iter().find(|h| !snapshot.contexts.contains(h)) {
        return Ok(Check::Ready(Detected::NewContext(new.clone())));
    }
    let location = browser.current_location().await?;
    if location != snapshot.location {
        return Ok(Check::Ready(Detected::SameContext(location)));
    }
    Ok(Check::pending(format!(
        "{} context(s), location {location}",
        contexts.len()
    )))
}

async fn settled_location<B: Browser + ?Sized>(browser: &B) -> HarnessResult<Check<String>> {
    let location = browser.current_location().await?;
    Ok(if is_blank(&location) {
        Check::pending(format!("location {location:?}"))
    } else {
        Check::Ready(location)
    })
}

async fn location_equals<B: Browser + ?Sized>(browser: &B, original: &str) -> HarnessResult<Check<()>> {
    let location = browser.current_location().await?;
    Ok(Check::when(location == original, location))
}

async fn location_matches<B: Browser + ?Sized>(
    browser: &B,
    expected: &CompiledPattern,
) -> HarnessResult<Check<()>> {
    let location = browser.current_location().await?;
    Ok(Check::when(expected.matches(&location), location))
}

fn log_secondary(failures: &[String], context: &str) {
    for failure in failures {
        tracing::warn!(failure = %failure, "{context}; restoration also failed");
    }
}
