//! Browser - abstract browser-control surface
//!
//! The harness never talks to a browser process directly. Everything it needs
//! goes through [`Browser`], so a WebDriver client, a CDP session or the
//! in-memory [`MockBrowser`](crate::mock::MockBrowser) can sit behind it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  ExternalLinkVerifier                                         │
//! │     │                                                         │
//! │     ├── LocatorResolver ──┐                                   │
//! │     └── WindowManager ────┼── Waiter ──► Browser (this trait) │
//! │                           │                                   │
//! └───────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! All methods take `&self`: implementations own their session state and the
//! harness issues one command at a time.

use crate::locator::Selector;
use crate::result::HarnessResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one browsing context (tab or window)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextHandle(String);

impl ContextHandle {
    /// Create a handle from its backend identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Backend identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element handle for DOM interactions
///
/// Only valid inside the context it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Unique identifier for the element
    pub id: String,
    /// Context the element was resolved in
    pub context: ContextHandle,
    /// Element tag name
    pub tag_name: String,
    /// Element text content
    pub text_content: Option<String>,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        context: ContextHandle,
        tag_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            context,
            tag_name: tag_name.into(),
            text_content: None,
        }
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }
}

/// Interaction performed on an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementAction {
    /// Click the element
    Click,
    /// Type text into the element
    Type(String),
    /// Clear the element's value
    Clear,
    /// Scroll the element into the viewport
    ScrollIntoView,
}

impl fmt::Display for ElementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click => f.write_str("click"),
            Self::Type(text) => write!(f, "type({text:?})"),
            Self::Clear => f.write_str("clear"),
            Self::ScrollIntoView => f.write_str("scroll into view"),
        }
    }
}

/// Abstract browser-control API consumed by the harness
///
/// # Errors
///
/// Implementations report a malformed selector as
/// [`HarnessError::SelectorSyntax`](crate::HarnessError::SelectorSyntax), a
/// detached element as `StaleElement`, a closed context as `NoSuchContext`
/// and anything else from the transport as `Browser`.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Location of the active context
    async fn current_location(&self) -> HarnessResult<String>;

    /// All open contexts, in backend order
    async fn list_contexts(&self) -> HarnessResult<Vec<ContextHandle>>;

    /// The active context
    async fn active_context(&self) -> HarnessResult<ContextHandle>;

    /// Make `handle` the active context
    async fn switch_to(&self, handle: &ContextHandle) -> HarnessResult<()>;

    /// Close the context identified by `handle`
    async fn close(&self, handle: &ContextHandle) -> HarnessResult<()>;

    /// Elements in the active context matching `selector`
    async fn find_candidates(&self, selector: &Selector) -> HarnessResult<Vec<ElementHandle>>;

    /// Whether the element is rendered and visible
    async fn is_displayed(&self, element: &ElementHandle) -> HarnessResult<bool>;

    /// Whether the element accepts interaction
    async fn is_enabled(&self, element: &ElementHandle) -> HarnessResult<bool>;

    /// Perform `action` on the element
    async fn act(&self, element: &ElementHandle, action: &ElementAction) -> HarnessResult<()>;

    /// Navigate the active context to `url`
    async fn navigate(&self, url: &str) -> HarnessResult<()>;

    /// Go back in the active context's history
    async fn go_back(&self) -> HarnessResult<()>;
}
