//! Multi-candidate element location.
//!
//! # Design Philosophy
//!
//! - **Ordered fallbacks**: a [`LocatorPlan`] lists alternative ways to find one
//!   logical element; the first candidate that is actionable *right now* wins,
//!   re-evaluated in declaration order on every poll.
//! - **Bounded**: one timeout covers the whole plan, however many candidates.
//! - **Read-only**: resolution only queries; actions happen after it returns.
//! - **Fail loudly on typos**: a malformed selector aborts resolution instead
//!   of being polled until the deadline.

use crate::driver::{Browser, ElementAction, ElementHandle};
use crate::result::{HarnessError, HarnessResult};
use crate::wait::{millis_ceil, Check, Deadline, WaitOptions, Waiter, DEFAULT_POLL_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default timeout for resolution (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// SELECTOR
// =============================================================================

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath selector (structural path)
    XPath(String),
    /// Visible text content
    Text(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
    /// Arbitrary attribute equality
    Attribute {
        /// Attribute name
        name: String,
        /// Expected value
        value: String,
    },
    /// Element id
    Id(String),
    /// Anchor with exactly this text
    LinkText(String),
    /// Anchor whose text contains this
    PartialLinkText(String),
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(path: impl Into<String>) -> Self {
        Self::XPath(path.into())
    }

    /// Create a visible-text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create an attribute selector
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create an id selector
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Create a link-text selector
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::LinkText(text.into())
    }

    /// Create a partial link-text selector
    #[must_use]
    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Self::PartialLinkText(text.into())
    }

    /// Strategy tag
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::Css(_) => "css",
            Self::XPath(_) => "xpath",
            Self::Text(_) => "text",
            Self::TestId(_) => "testid",
            Self::Attribute { .. } => "attribute",
            Self::Id(_) => "id",
            Self::LinkText(_) => "link",
            Self::PartialLinkText(_) => "partial-link",
        }
    }

    /// Check the selector is well formed
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::SelectorSyntax`] describing the first problem.
    pub fn validate(&self) -> HarnessResult<()> {
        let problem = match self {
            Self::Css(s) => blank(s).or_else(|| unbalanced(s)),
            Self::XPath(s) => blank(s).or_else(|| {
                let first = s.trim_start().chars().next();
                if matches!(first, Some('/' | '(' | '.')) {
                    unbalanced(s)
                } else {
                    Some("xpath must start with '/', '(' or '.'".to_string())
                }
            }),
            Self::Attribute { name, .. } => {
                if name.is_empty() {
                    Some("attribute name is empty".to_string())
                } else if name
                    .chars()
                    .any(|c| c.is_whitespace() || "\"'[]=<>".contains(c))
                {
                    Some(format!("attribute name {name:?} contains illegal characters"))
                } else {
                    None
                }
            }
            Self::Text(s)
            | Self::TestId(s)
            | Self::Id(s)
            | Self::LinkText(s)
            | Self::PartialLinkText(s) => blank(s),
        };

        match problem {
            Some(message) => Err(HarnessError::SelectorSyntax {
                selector: self.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }
}

fn blank(s: &str) -> Option<String> {
    s.trim().is_empty().then(|| "selector is empty".to_string())
}

/// First quoting or bracketing problem in `s`
fn unbalanced(s: &str) -> Option<String> {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '(' => stack.push(c),
            ']' | ')' => {
                let open = if c == ']' { '[' } else { '(' };
                if stack.pop() != Some(open) {
                    return Some(format!("unexpected '{c}'"));
                }
            }
            _ => {}
        }
    }
    if let Some(q) = quote {
        return Some(format!("unterminated {q} quote"));
    }
    stack.pop().map(|open| format!("unclosed '{open}'"))
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute { name, value } => write!(f, "[{name}={value:?}]"),
            Self::Css(s)
            | Self::XPath(s)
            | Self::Text(s)
            | Self::TestId(s)
            | Self::Id(s)
            | Self::LinkText(s)
            | Self::PartialLinkText(s) => write!(f, "{}={s}", self.strategy()),
        }
    }
}

// =============================================================================
// LOCATOR PLAN
// =============================================================================

/// Ordered, non-empty list of alternative selectors for one element
///
/// Serialized as a bare list of selectors; deserializing an empty list fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Selector>", into = "Vec<Selector>")]
pub struct LocatorPlan {
    candidates: Vec<Selector>,
}

impl LocatorPlan {
    /// Plan with a single candidate
    #[must_use]
    pub fn new(first: Selector) -> Self {
        Self {
            candidates: vec![first],
        }
    }

    /// Append a fallback candidate
    #[must_use]
    pub fn or(mut self, next: Selector) -> Self {
        self.candidates.push(next);
        self
    }

    /// Candidates in declaration order
    #[must_use]
    pub fn candidates(&self) -> &[Selector] {
        &self.candidates
    }

    /// Validate every candidate
    ///
    /// # Errors
    ///
    /// Returns the first candidate's [`HarnessError::SelectorSyntax`].
    pub fn validate(&self) -> HarnessResult<()> {
        self.candidates.iter().try_for_each(Selector::validate)
    }
}

impl From<Selector> for LocatorPlan {
    fn from(selector: Selector) -> Self {
        Self::new(selector)
    }
}

impl TryFrom<Vec<Selector>> for LocatorPlan {
    type Error = HarnessError;

    fn try_from(candidates: Vec<Selector>) -> HarnessResult<Self> {
        if candidates.is_empty() {
            return Err(HarnessError::InvalidPlan {
                message: "a locator plan needs at least one candidate".to_string(),
            });
        }
        Ok(Self { candidates })
    }
}

impl From<LocatorPlan> for Vec<Selector> {
    fn from(plan: LocatorPlan) -> Self {
        plan.candidates
    }
}

impl fmt::Display for LocatorPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, selector) in self.candidates.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{selector}")?;
        }
        f.write_str("]")
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// How ready an element must be to count as resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Actionability {
    /// Present in the document
    Attached,
    /// Present and displayed
    Visible,
    /// Displayed and enabled
    #[default]
    Interactable,
}

impl fmt::Display for Actionability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Attached => "attached",
            Self::Visible => "visible",
            Self::Interactable => "interactable",
        })
    }
}

/// Locator options for customizing behavior
#[derive(Debug, Clone, Copy)]
pub struct LocatorOptions {
    /// Timeout for the whole plan
    pub timeout: Duration,
    /// Polling interval between passes over the plan
    pub poll_interval: Duration,
    /// Readiness required of a match
    pub actionability: Actionability,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            actionability: Actionability::Interactable,
        }
    }
}

impl LocatorOptions {
    /// Set a custom timeout
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

    /// Set the readiness requirement
    #[must_use]
    pub const fn with_actionability(mut self, actionability: Actionability) -> Self {
        self.actionability = actionability;
        self
    }

    fn wait_options(&self) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(millis_ceil(self.timeout))
            .with_poll_interval(millis_ceil(self.poll_interval))
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// A successfully resolved element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The element
    pub element: ElementHandle,
    /// Candidate that located it
    pub selector: Selector,
    /// Position of that candidate in the plan
    pub candidate_index: usize,
}

/// Resolves locator plans against a browser
#[derive(Debug)]
pub struct LocatorResolver<'b, B: Browser + ?Sized> {
    browser: &'b B,
    options: LocatorOptions,
}

impl<'b, B: Browser + ?Sized> LocatorResolver<'b, B> {
    /// Resolver with default options
    #[must_use]
    pub fn new(browser: &'b B) -> Self {
        Self::with_options(browser, LocatorOptions::default())
    }

    /// Resolver with custom options
    #[must_use]
    pub const fn with_options(browser: &'b B, options: LocatorOptions) -> Self {
        Self { browser, options }
    }

    /// Get the options
    #[must_use]
    pub const fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// Resolve `plan` to the first actionable element
    ///
    /// # Errors
    ///
    /// [`HarnessError::SelectorSyntax`] immediately for a malformed candidate,
    /// [`HarnessError::NotFound`] once the timeout has elapsed.
    pub async fn resolve(&self, plan: &LocatorPlan) -> HarnessResult<Resolved> {
        plan.validate()?;
        let waiter = Waiter::with_options(self.options.wait_options());
        let deadline = Deadline::after(self.options.timeout);
        let waited_for = plan.to_string();

        let this = self;
        let result = waiter
            .until_deadline(&deadline, &waited_for, move || this.probe(plan))
            .await;

        match result {
            Ok(resolved) => {
                tracing::debug!(
                    selector = %resolved.selector,
                    candidate = resolved.candidate_index,
                    element = %resolved.element.id,
                    "resolved locator plan"
                );
                Ok(resolved)
            }
            Err(HarnessError::Timeout {
                elapsed,
                last_observed,
                ..
            }) => Err(HarnessError::NotFound {
                plan: waited_for,
                elapsed,
                last_observed,
            }),
            Err(err) => Err(err),
        }
    }

    /// One pass over the plan in declaration order
    async fn probe(&self, plan: &LocatorPlan) -> HarnessResult<Check<Resolved>> {
        let mut observations = Vec::with_capacity(plan.candidates().len());

        for (candidate_index, selector) in plan.candidates().iter().enumerate() {
            let elements = match self.browser.find_candidates(selector).await {
                Ok(elements) => elements,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    observations.push(format!("{selector}: {err}"));
                    continue;
                }
            };
            if elements.is_empty() {
                observations.push(format!("{selector}: no match"));
                continue;
            }

            let total = elements.len();
            for element in elements {
                match self.is_actionable(&element).await {
                    Ok(true) => {
                        return Ok(Check::Ready(Resolved {
                            element,
                            selector: selector.clone(),
                            candidate_index,
                        }))
                    }
                    Ok(false) => {}
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(_) => {}
                }
            }
            observations.push(format!(
                "{selector}: {total} match(es), none {}",
                self.options.actionability
            ));
        }

        Ok(Check::Pending(observations.join("; ")))
    }

    async fn is_actionable(&self, element: &ElementHandle) -> HarnessResult<bool> {
        match self.options.actionability {
            Actionability::Attached => Ok(true),
            Actionability::Visible => self.browser.is_displayed(element).await,
            Actionability::Interactable => {
                Ok(self.browser.is_displayed(element).await?
                    && self.browser.is_enabled(element).await?)
            }
        }
    }

    /// Single non-waiting probe: is any candidate actionable right now?
    ///
    /// # Errors
    ///
    /// Fatal selector errors only.
    pub async fn is_present(&self, plan: &LocatorPlan) -> HarnessResult<bool> {
        plan.validate()?;
        Ok(self.probe(plan).await?.is_ready())
    }

    /// Every displayed element matching `selector`, without waiting
    ///
    /// # Errors
    ///
    /// Errors from the browser while listing candidates.
    pub async fn find_all_displayed(&self, selector: &Selector) -> HarnessResult<Vec<ElementHandle>> {
        selector.validate()?;
        let mut displayed = Vec::new();
        for element in self.browser.find_candidates(selector).await? {
            if self.browser.is_displayed(&element).await.unwrap_or(false) {
                displayed.push(element);
            }
        }
        Ok(displayed)
    }

    /// Resolve then click
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve); also the click's own error.
    pub async fn click(&self, plan: &LocatorPlan) -> HarnessResult<Resolved> {
        let resolved = self.resolve(plan).await?;
        self.browser
            .act(&resolved.element, &ElementAction::Click)
            .await?;
        Ok(resolved)
    }

    /// Click the first actionable candidate if there is one right now
    ///
    /// # Errors
    ///
    /// Fatal selector errors and the click's own error.
    pub async fn click_if_present(&self, plan: &LocatorPlan) -> HarnessResult<bool> {
        plan.validate()?;
        match self.probe(plan).await? {
            Check::Ready(resolved) => {
                self.browser
                    .act(&resolved.element, &ElementAction::Click)
                    .await?;
                Ok(true)
            }
            Check::Pending(_) => Ok(false),
        }
    }

    /// Resolve, clear, then type `text`
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve); also the actions' own errors.
    pub async fn fill(&self, plan: &LocatorPlan, text: &str) -> HarnessResult<Resolved> {
        let resolved = self.resolve(plan).await?;
        self.browser
            .act(&resolved.element, &ElementAction::Clear)
            .await?;
        self.browser
            .act(&resolved.element, &ElementAction::Type(text.to_string()))
            .await?;
        Ok(resolved)
    }
}

// =============================================================================
// TESTS
// =============================================================================
