//! In-memory [`Browser`] for unit and integration testing.
//!
//! Contexts, elements and click behaviour are scripted up front. Anything with
//! a delay is keyed on `tokio::time::Instant` and settled lazily on the next
//! call, so a paused test runtime drives it deterministically.

use crate::driver::{Browser, ContextHandle, ElementAction, ElementHandle};
use crate::locator::Selector;
use crate::location::is_blank;
use crate::result::{HarnessError, HarnessResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// What clicking an element does
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkBehavior {
    /// Nothing observable
    #[default]
    Nothing,
    /// Open a new context already showing `url`
    OpenContext {
        /// Location of the new context
        url: String,
    },
    /// Open a new context showing `url` once `delay` has passed
    OpenContextAfter {
        /// Location of the new context
        url: String,
        /// Time until the context appears
        delay: Duration,
    },
    /// Open a blank context that commits `url` after `load_after`
    OpenContextLoading {
        /// Location committed once loaded
        url: String,
        /// Time spent on about:blank
        load_after: Duration,
    },
    /// Navigate the element's own context to `url`
    Navigate {
        /// New location
        url: String,
    },
    /// Navigate the element's own context to `url` once `delay` has passed
    NavigateAfter {
        /// New location
        url: String,
        /// Time until the navigation commits
        delay: Duration,
    },
    /// Open a new context showing `new_url` and navigate the element's own
    /// context to `url`
    OpenContextAndNavigate {
        /// Location of the new context
        new_url: String,
        /// New location of the element's context
        url: String,
    },
}

/// Scripted element
#[derive(Debug, Clone)]
pub struct MockElement {
    id: String,
    tag: String,
    text: Option<String>,
    value: String,
    selectors: Vec<Selector>,
    displayed: bool,
    enabled: bool,
    scrollable: bool,
    appears_after: Option<Duration>,
    visible_from: Option<Instant>,
    context: Option<ContextHandle>,
    on_click: LinkBehavior,
}

impl MockElement {
    /// Displayed, enabled element matched by nothing yet
    #[must_use]
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            text: None,
            value: String::new(),
            selectors: Vec::new(),
            displayed: true,
            enabled: true,
            scrollable: true,
            appears_after: None,
            visible_from: None,
            context: None,
            on_click: LinkBehavior::Nothing,
        }
    }

    /// Make `selector` find this element
    #[must_use]
    pub fn matching(mut self, selector: Selector) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Attached but not displayed
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Displayed but not enabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Fail scroll-into-view requests
    #[must_use]
    pub const fn rejecting_scroll(mut self) -> Self {
        self.scrollable = false;
        self
    }

    /// Attach only once `delay` has passed after being added
    #[must_use]
    pub const fn appearing_after(mut self, delay: Duration) -> Self {
        self.appears_after = Some(delay);
        self
    }

    /// Set the click behaviour
    #[must_use]
    pub fn on_click(mut self, behavior: LinkBehavior) -> Self {
        self.on_click = behavior;
        self
    }

    /// Place in a specific context (defaults to the active one)
    #[must_use]
    pub fn in_context(mut self, context: ContextHandle) -> Self {
        self.context = Some(context);
        self
    }

    /// Initial input value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    fn is_attached(&self, now: Instant) -> bool {
        self.visible_from.map_or(true, |at| now >= at)
    }

    fn handle(&self, context: ContextHandle) -> ElementHandle {
        let handle = ElementHandle::new(self.id.clone(), context, self.tag.clone());
        match &self.text {
            Some(text) => handle.with_text(text.clone()),
            None => handle,
        }
    }
}

#[derive(Debug)]
struct MockContext {
    handle: ContextHandle,
    location: String,
    back: Vec<String>,
    commit: Option<(Instant, String)>,
}

impl MockContext {
    fn new(handle: ContextHandle, location: String) -> Self {
        Self {
            handle,
            location,
            back: Vec::new(),
            commit: None,
        }
    }

    fn go(&mut self, url: String) {
        let previous = std::mem::replace(&mut self.location, url);
        if !is_blank(&previous) {
            self.back.push(previous);
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    contexts: Vec<MockContext>,
    active: Option<ContextHandle>,
    elements: Vec<MockElement>,
    scheduled: Vec<(Instant, String)>,
    next_id: usize,
    history: Vec<String>,
    failing_close: HashSet<ContextHandle>,
    rejected: Vec<Selector>,
    stale_queries: u32,
}

impl MockState {
    fn open(&mut self, location: String) -> ContextHandle {
        self.next_id += 1;
        let handle = ContextHandle::new(format!("w{}", self.next_id));
        self.contexts
            .push(MockContext::new(handle.clone(), location));
        handle
    }

    /// Apply every delayed effect that is due
    fn settle(&mut self) {
        let now = Instant::now();

        self.scheduled.sort_by_key(|(at, _)| *at);
        let due = self.scheduled.iter().take_while(|(at, _)| *at <= now).count();
        let opened: Vec<_> = self.scheduled.drain(..due).collect();
        for (_, url) in opened {
            self.open(url);
        }

        for context in &mut self.contexts {
            if context.commit.as_ref().is_some_and(|(at, _)| *at <= now) {
                if let Some((_, url)) = context.commit.take() {
                    context.go(url);
                }
            }
        }
    }

    fn context(&self, handle: &ContextHandle) -> HarnessResult<&MockContext> {
        self.contexts
            .iter()
            .find(|c| &c.handle == handle)
            .ok_or_else(|| HarnessError::NoSuchContext {
                handle: handle.to_string(),
            })
    }

    fn context_mut(&mut self, handle: &ContextHandle) -> HarnessResult<&mut MockContext> {
        self.contexts
            .iter_mut()
            .find(|c| &c.handle == handle)
            .ok_or_else(|| HarnessError::NoSuchContext {
                handle: handle.to_string(),
            })
    }

    fn active(&self) -> HarnessResult<ContextHandle> {
        self.active.clone().ok_or_else(|| HarnessError::NoSuchContext {
            handle: "(none active)".to_string(),
        })
    }

    fn element(&self, handle: &ElementHandle) -> HarnessResult<&MockElement> {
        let stale = || HarnessError::StaleElement {
            id: handle.id.clone(),
        };
        let element = self
            .elements
            .iter()
            .find(|e| e.id == handle.id && e.context.as_ref() == Some(&handle.context))
            .ok_or_else(stale)?;
        if self.context(&handle.context).is_err() {
            return Err(stale());
        }
        Ok(element)
    }

    fn click(&mut self, context: &ContextHandle, behavior: LinkBehavior) -> HarnessResult<()> {
        let now = Instant::now();
        match behavior {
            LinkBehavior::Nothing => {}
            LinkBehavior::OpenContext { url } => {
                self.open(url);
            }
            LinkBehavior::OpenContextAfter { url, delay } => {
                self.scheduled.push((now + delay, url));
            }
            LinkBehavior::OpenContextLoading { url, load_after } => {
                let handle = self.open("about:blank".to_string());
                self.context_mut(&handle)?.commit = Some((now + load_after, url));
            }
            LinkBehavior::Navigate { url } => self.context_mut(context)?.go(url),
            LinkBehavior::NavigateAfter { url, delay } => {
                self.context_mut(context)?.commit = Some((now + delay, url));
            }
            LinkBehavior::OpenContextAndNavigate { new_url, url } => {
                self.open(new_url);
                self.context_mut(context)?.go(url);
            }
        }
        Ok(())
    }
}

/// Scriptable in-memory browser
#[derive(Debug)]
pub struct MockBrowser {
    state: Mutex<MockState>,
}

impl MockBrowser {
    /// Browser with one active context showing `start_url`
    #[must_use]
    pub fn new(start_url: impl Into<String>) -> Self {
        let mut state = MockState::default();
        let first = state.open(start_url.into());
        state.active = Some(first);
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an element; placed in the active context unless it names one
    pub fn add_element(&self, mut element: MockElement) {
        let mut state = self.state();
        if element.context.is_none() {
            element.context = state
                .active
                .clone()
                .or_else(|| state.contexts.first().map(|c| c.handle.clone()));
        }
        element.visible_from = element.appears_after.map(|d| Instant::now() + d);
        state.elements.push(element);
    }

    /// Open a context outside any trigger, leaving the active one unchanged
    pub fn open_context(&self, url: impl Into<String>) -> ContextHandle {
        self.state().open(url.into())
    }

    /// Make closing `handle` fail
    pub fn fail_close(&self, handle: &ContextHandle) {
        self.state().failing_close.insert(handle.clone());
    }

    /// Report `selector` as malformed when queried
    pub fn reject_selector(&self, selector: Selector) {
        self.state().rejected.push(selector);
    }

    /// Fail the next `count` element queries with a stale-element error
    pub fn fail_next_queries(&self, count: u32) {
        self.state().stale_queries = count;
    }

    /// Open contexts in creation order
    #[must_use]
    pub fn contexts(&self) -> Vec<ContextHandle> {
        let mut state = self.state();
        state.settle();
        state.contexts.iter().map(|c| c.handle.clone()).collect()
    }

    /// Active context, if any
    #[must_use]
    pub fn active(&self) -> Option<ContextHandle> {
        self.state().active.clone()
    }

    /// Location of `handle`, if open
    #[must_use]
    pub fn location_of(&self, handle: &ContextHandle) -> Option<String> {
        let mut state = self.state();
        state.settle();
        state.context(handle).ok().map(|c| c.location.clone())
    }

    /// Current value of an input element
    #[must_use]
    pub fn value_of(&self, id: &str) -> Option<String> {
        self.state()
            .elements
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.value.clone())
    }

    /// Commands received so far
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Check if a command starting with `method` was received
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.state().history.iter().any(|c| c.starts_with(method))
    }

    /// Number of commands starting with `method`
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .history
            .iter()
            .filter(|c| c.starts_with(method))
            .count()
    }
}

#[async_trait]
impl Browser for MockBrowser {
    async fn current_location(&self) -> HarnessResult<String> {
        let mut state = self.state();
        state.settle();
        let active = state.active()?;
        Ok(state.context(&active)?.location.clone())
    }

    async fn list_contexts(&self) -> HarnessResult<Vec<ContextHandle>> {
        let mut state = self.state();
        state.settle();
        Ok(state.contexts.iter().map(|c| c.handle.clone()).collect())
    }

    async fn active_context(&self) -> HarnessResult<ContextHandle> {
        self.state().active()
    }

    async fn switch_to(&self, handle: &ContextHandle) -> HarnessResult<()> {
        let mut state = self.state();
        state.settle();
        state.history.push(format!("switch:{handle}"));
        state.context(handle)?;
        state.active = Some(handle.clone());
        Ok(())
    }

    async fn close(&self, handle: &ContextHandle) -> HarnessResult<()> {
        let mut state = self.state();
        state.settle();
        state.history.push(format!("close:{handle}"));
        if state.failing_close.contains(handle) {
            return Err(HarnessError::browser(format!("refused to close {handle}")));
        }
        state.context(handle)?;
        state.contexts.retain(|c| &c.handle != handle);
        if state.active.as_ref() == Some(handle) {
            state.active = None;
        }
        Ok(())
    }

    async fn find_candidates(&self, selector: &Selector) -> HarnessResult<Vec<ElementHandle>> {
        let mut state = self.state();
        state.settle();
        state.history.push(format!("find:{selector}"));

        if state.rejected.contains(selector) {
            return Err(HarnessError::SelectorSyntax {
                selector: selector.to_string(),
                message: "rejected by browser".to_string(),
            });
        }
        if state.stale_queries > 0 {
            state.stale_queries -= 1;
            return Err(HarnessError::StaleElement {
                id: selector.to_string(),
            });
        }

        let active = state.active()?;
        let now = Instant::now();
        Ok(state
            .elements
            .iter()
            .filter(|e| e.context.as_ref() == Some(&active))
            .filter(|e| e.is_attached(now) && e.selectors.contains(selector))
            .map(|e| e.handle(active.clone()))
            .collect())
    }

    async fn is_displayed(&self, element: &ElementHandle) -> HarnessResult<bool> {
        Ok(self.state().element(element)?.displayed)
    }

    async fn is_enabled(&self, element: &ElementHandle) -> HarnessResult<bool> {
        Ok(self.state().element(element)?.enabled)
    }

    async fn act(&self, element: &ElementHandle, action: &ElementAction) -> HarnessResult<()> {
        let mut state = self.state();
        state.settle();
        let tag = match action {
            ElementAction::Click => format!("act:click:{}", element.id),
            ElementAction::Type(text) => format!("act:type:{}:{text}", element.id),
            ElementAction::Clear => format!("act:clear:{}", element.id),
            ElementAction::ScrollIntoView => format!("act:scroll:{}", element.id),
        };
        state.history.push(tag);

        if state.active.as_ref() != Some(&element.context) {
            return Err(HarnessError::StaleElement {
                id: element.id.clone(),
            });
        }
        let target = state.element(element)?;
        let (enabled, scrollable, behavior) =
            (target.enabled, target.scrollable, target.on_click.clone());

        match action {
            ElementAction::Click if !enabled => Err(HarnessError::browser(format!(
                "element {} is not interactable",
                element.id
            ))),
            ElementAction::Click => state.click(&element.context, behavior),
            ElementAction::ScrollIntoView if !scrollable => Err(HarnessError::browser(
                format!("cannot scroll {} into view", element.id),
            )),
            ElementAction::ScrollIntoView => Ok(()),
            ElementAction::Type(text) => {
                if let Some(e) = state.elements.iter_mut().find(|e| e.id == element.id) {
                    e.value.push_str(text);
                }
                Ok(())
            }
            ElementAction::Clear => {
                if let Some(e) = state.elements.iter_mut().find(|e| e.id == element.id) {
                    e.value.clear();
                }
                Ok(())
            }
        }
    }

    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        let mut state = self.state();
        state.settle();
        state.history.push(format!("navigate:{url}"));
        let active = state.active()?;
        let context = state.context_mut(&active)?;
        context.commit = None;
        context.go(url.to_string());
        Ok(())
    }

    async fn go_back(&self) -> HarnessResult<()> {
        let mut state = self.state();
        state.settle();
        state.history.push("back".to_string());
        let active = state.active()?;
        let context = state.context_mut(&active)?;
        context.commit = None;
        if let Some(previous) = context.back.pop() {
            context.location = previous;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod context_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_starts_with_one_active_context() {
            let browser = MockBrowser::new("https://app.test/");
            let contexts = browser.list_contexts().await.unwrap();
            assert_eq!(contexts, vec![ContextHandle::new("w1")]);
            assert_eq!(browser.active_context().await.unwrap(), contexts[0]);
            assert_eq!(
                browser.current_location().await.unwrap(),
                "https://app.test/"
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_closing_active_leaves_no_active_context() {
            let browser = MockBrowser::new("https://app.test/");
            let other = browser.open_context("https://other.test/");
            browser.switch_to(&other).await.unwrap();
            browser.close(&other).await.unwrap();
            assert!(browser.active().is_none());
            assert!(matches!(
                browser.current_location().await,
                Err(HarnessError::NoSuchContext { .. })
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn test_close_failure_keeps_context() {
            let browser = MockBrowser::new("https://app.test/");
            let other = browser.open_context("https://other.test/");
            browser.fail_close(&other);
            assert!(browser.close(&other).await.is_err());
            assert_eq!(browser.contexts().len(), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_switch_to_unknown_context() {
            let browser = MockBrowser::new("https://app.test/");
            let err = browser
                .switch_to(&ContextHandle::new("w9"))
                .await
                .unwrap_err();
            assert!(matches!(err, HarnessError::NoSuchContext { .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_navigate_and_back() {
            let browser = MockBrowser::new("https://app.test/");
            browser.navigate("https://app.test/next").await.unwrap();
            browser.go_back().await.unwrap();
            assert_eq!(
                browser.current_location().await.unwrap(),
                "https://app.test/"
            );
            assert!(browser.was_called("navigate:https://app.test/next"));
            assert!(browser.was_called("back"));
        }
    }

    mod behavior_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_click_opens_context_without_focus() {
            let browser = MockBrowser::new("https://app.test/");
            browser.add_element(
                MockElement::new("tw", "a")
                    .matching(Selector::link_text("Twitter"))
                    .on_click(LinkBehavior::OpenContext {
                        url: "https://twitter.com/x".into(),
                    }),
            );
            let link = browser
                .find_candidates(&Selector::link_text("Twitter"))
                .await
                .unwrap()
                .remove(0);
            browser.act(&link, &ElementAction::Click).await.unwrap();

            let contexts = browser.contexts();
            assert_eq!(contexts.len(), 2);
            assert_eq!(browser.active(), Some(ContextHandle::new("w1")));
            assert_eq!(
                browser.location_of(&contexts[1]).as_deref(),
                Some("https://twitter.com/x")
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_delayed_context_and_loading() {
            let browser = MockBrowser::new("https://app.test/");
            browser.add_element(
                MockElement::new("a", "a")
                    .matching(Selector::id("a"))
                    .on_click(LinkBehavior::OpenContextAfter {
                        url: "https://late.test/".into(),
                        delay: Duration::from_millis(500),
                    }),
            );
            browser.add_element(
                MockElement::new("b", "a")
                    .matching(Selector::id("b"))
                    .on_click(LinkBehavior::OpenContextLoading {
                        url: "https://slow.test/".into(),
                        load_after: Duration::from_millis(300),
                    }),
            );
            for id in ["a", "b"] {
                let el = browser
                    .find_candidates(&Selector::id(id))
                    .await
                    .unwrap()
                    .remove(0);
                browser.act(&el, &ElementAction::Click).await.unwrap();
            }

            let loading = ContextHandle::new("w2");
            assert_eq!(browser.contexts().len(), 2);
            assert_eq!(browser.location_of(&loading).as_deref(), Some("about:blank"));

            tokio::time::advance(Duration::from_millis(300)).await;
            assert_eq!(
                browser.location_of(&loading).as_deref(),
                Some("https://slow.test/")
            );

            tokio::time::advance(Duration::from_millis(200)).await;
            assert_eq!(browser.contexts().len(), 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_appearing_element() {
            let browser = MockBrowser::new("https://app.test/");
            browser.add_element(
                MockElement::new("late", "div")
                    .matching(Selector::id("late"))
                    .appearing_after(Duration::from_millis(100)),
            );
            assert!(browser
                .find_candidates(&Selector::id("late"))
                .await
                .unwrap()
                .is_empty());
            tokio::time::advance(Duration::from_millis(100)).await;
            assert_eq!(
                browser
                    .find_candidates(&Selector::id("late"))
                    .await
                    .unwrap()
                    .len(),
                1
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_disabled_click_rejected() {
            let browser = MockBrowser::new("https://app.test/");
            browser.add_element(MockElement::new("x", "button").matching(Selector::id("x")).disabled());
            let el = browser
                .find_candidates(&Selector::id("x"))
                .await
                .unwrap()
                .remove(0);
            assert!(browser.act(&el, &ElementAction::Click).await.is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn test_elements_are_scoped_to_their_context() {
            let browser = MockBrowser::new("https://app.test/");
            let other = browser.open_context("https://other.test/");
            browser.add_element(
                MockElement::new("remote", "div")
                    .matching(Selector::id("r"))
                    .in_context(other.clone()),
            );
            assert!(browser
                .find_candidates(&Selector::id("r"))
                .await
                .unwrap()
                .is_empty());
            browser.switch_to(&other).await.unwrap();
            assert_eq!(
                browser
                    .find_candidates(&Selector::id("r"))
                    .await
                    .unwrap()
                    .len(),
                1
            );
        }
    }
}
