//! Harness configuration.
//!
//! Timings usually come from a YAML file checked in next to the test suite,
//! with environment overrides for slow CI machines:
//!
//! ```yaml
//! default_timeout_ms: 15000
//! poll_interval_ms: 250
//! restore_timeout_ms: 5000
//! settle_blank_pages: true
//! scroll_into_view: true
//! ```

use crate::locator::LocatorOptions;
use crate::result::{HarnessError, HarnessResult};
use crate::verifier::ExternalLinkOptions;
use crate::wait::{WaitOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};
use crate::window::{NavigationOptions, SameContextRestore, DEFAULT_RESTORE_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Overrides `default_timeout_ms`
pub const TIMEOUT_ENV: &str = "NAVWATCH_TIMEOUT_MS";

/// Overrides `poll_interval_ms`
pub const POLL_INTERVAL_ENV: &str = "NAVWATCH_POLL_INTERVAL_MS";

/// Harness-wide timing and behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Timeout for waits, resolution and navigation
    pub default_timeout_ms: u64,
    /// Polling interval for every wait
    pub poll_interval_ms: u64,
    /// Budget for restoring the session after a navigation
    pub restore_timeout_ms: u64,
    /// Wait for new contexts to leave about:blank
    pub settle_blank_pages: bool,
    /// Scroll links into view before clicking them
    pub scroll_into_view: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            restore_timeout_ms: DEFAULT_RESTORE_TIMEOUT_MS,
            settle_blank_pages: true,
            scroll_into_view: true,
        }
    }
}

impl HarnessConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from YAML; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// [`HarnessError::Config`] on malformed YAML, [`HarnessError::InvalidConfig`]
    /// if the values fail [`validate`](Self::validate).
    pub fn from_yaml_str(yaml: &str) -> HarnessResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    ///
    /// # Errors
    ///
    /// [`HarnessError::Io`] if the file cannot be read, otherwise as
    /// [`from_yaml_str`](Self::from_yaml_str).
    pub fn from_yaml_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// [`HarnessError::Config`] if serialization fails.
    pub fn to_yaml(&self) -> HarnessResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Apply `NAVWATCH_TIMEOUT_MS` / `NAVWATCH_POLL_INTERVAL_MS`
    ///
    /// # Errors
    ///
    /// [`HarnessError::InvalidConfig`] if a variable is set but not a number.
    pub fn with_env_overrides(self) -> HarnessResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> HarnessResult<Self> {
        if let Some(value) = lookup(TIMEOUT_ENV) {
            self.default_timeout_ms = parse_ms(TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(POLL_INTERVAL_ENV) {
            self.poll_interval_ms = parse_ms(POLL_INTERVAL_ENV, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Set the default timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Reject values that make waits meaningless
    ///
    /// # Errors
    ///
    /// [`HarnessError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(HarnessError::invalid_config("poll_interval_ms must be greater than zero"));
        }
        if self.restore_timeout_ms == 0 {
            return Err(HarnessError::invalid_config("restore_timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Options for a plain wait
    #[must_use]
    pub const fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.default_timeout_ms,
            poll_interval_ms: self.poll_interval_ms,
            fatal: None,
        }
    }

    /// Options for locator resolution
    #[must_use]
    pub fn locator_options(&self) -> LocatorOptions {
        LocatorOptions::default()
            .with_timeout(Duration::from_millis(self.default_timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }

    /// Options for a navigation with the given same-context policy
    #[must_use]
    pub const fn navigation_options(&self, same_context: SameContextRestore) -> NavigationOptions {
        NavigationOptions::new(same_context)
            .with_timeout(Duration::from_millis(self.default_timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_restore_timeout(Duration::from_millis(self.restore_timeout_ms))
            .with_settle_blank(self.settle_blank_pages)
    }

    /// Options for an external link check
    #[must_use]
    pub fn external_link_options(&self, same_context: SameContextRestore) -> ExternalLinkOptions {
        ExternalLinkOptions::new(same_context)
            .with_locator(self.locator_options())
            .with_navigation(self.navigation_options(same_context))
            .with_scroll_into_view(self.scroll_into_view)
    }
}

fn parse_ms(key: &str, value: &str) -> HarnessResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| HarnessError::invalid_config(format!("{key}={value:?} is not a number of milliseconds")))
}
