//! Result and error types for navwatch.

use std::time::Duration;
use thiserror::Error;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while driving the harness
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A wait's deadline elapsed without the condition becoming true
    #[error("Timed out after {}ms waiting for {waited_for}{}", .elapsed.as_millis(), observed_suffix(.last_observed.as_deref()))]
    Timeout {
        /// What was being waited for
        waited_for: String,
        /// Time spent waiting
        elapsed: Duration,
        /// Last state observed by the probe
        last_observed: Option<String>,
    },

    /// No locator candidate matched within the deadline
    #[error("No element found for {plan} after {}ms{}", .elapsed.as_millis(), observed_suffix(.last_observed.as_deref()))]
    NotFound {
        /// Rendered locator plan, every candidate in order
        plan: String,
        /// Time spent resolving
        elapsed: Duration,
        /// Last state observed while resolving
        last_observed: Option<String>,
    },

    /// Malformed selector; never retried
    #[error("Invalid selector {selector}: {message}")]
    SelectorSyntax {
        /// Selector as rendered
        selector: String,
        /// What is wrong with it
        message: String,
    },

    /// The trigger produced neither a new context nor a location change
    #[error("No navigation occurred within {}ms (contexts: {contexts}, location: {location})", .elapsed.as_millis())]
    NoNavigationOccurred {
        /// Time spent waiting
        elapsed: Duration,
        /// Number of open contexts at the last poll
        contexts: usize,
        /// Location of the original context at the last poll
        location: String,
    },

    /// Post-navigation location did not match the expectation
    #[error("Assertion failed: expected location {expected}, got {actual}")]
    AssertionFailed {
        /// Expected location pattern
        expected: String,
        /// Location actually observed
        actual: String,
    },

    /// External link verification failed
    #[error("External link {candidate} ({trigger}) failed: {source}")]
    ExternalLink {
        /// Candidate selector that located the link
        candidate: String,
        /// Trigger used to activate it
        trigger: String,
        /// Underlying failure
        #[source]
        source: Box<HarnessError>,
    },

    /// Restoration failed after an otherwise successful verification
    #[error("Failed to restore browsing context: {}", .failures.join("; "))]
    Restoration {
        /// Every restoration step that failed
        failures: Vec<String>,
    },

    /// Error reported by the browser-control backend
    #[error("Browser error: {message}")]
    Browser {
        /// Error message
        message: String,
    },

    /// Element handle is no longer attached to the document
    #[error("Stale element: {id}")]
    StaleElement {
        /// Element identifier
        id: String,
    },

    /// Context handle does not exist (closed or never opened)
    #[error("No such browsing context: {handle}")]
    NoSuchContext {
        /// Context handle
        handle: String,
    },

    /// Locator plan cannot be resolved as constructed
    #[error("Invalid locator plan: {message}")]
    InvalidPlan {
        /// Error message
        message: String,
    },

    /// Option values that make an operation meaningless
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// YAML configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml_ng::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn observed_suffix(observed: Option<&str>) -> String {
    observed.map_or_else(String::new, |o| format!(" (last observed: {o})"))
}

impl HarnessError {
    /// Create a browser backend error
    #[must_use]
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Errors that must abort a wait immediately instead of being retried
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SelectorSyntax { .. } | Self::InvalidPlan { .. } | Self::InvalidConfig { .. }
        )
    }

    /// Errors caused by the DOM or context set changing under a query
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StaleElement { .. } | Self::NoSuchContext { .. } | Self::Browser { .. }
        )
    }
}
