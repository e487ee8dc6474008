//! External link verification: locate, activate, check the destination, restore.

use crate::driver::{Browser, ElementAction, ElementHandle};
use crate::locator::{LocatorOptions, LocatorPlan, LocatorResolver};
use crate::location::LocationPattern;
use crate::result::{HarnessError, HarnessResult};
use crate::window::{NavigationOptions, NavigationOutcome, SameContextRestore, WindowManager};

/// Options for external link checks
#[derive(Debug, Clone, Copy)]
pub struct ExternalLinkOptions {
    /// Resolution of the link element
    pub locator: LocatorOptions,
    /// Navigation, assertion and restoration
    pub navigation: NavigationOptions,
    /// Scroll the link into view before clicking (best effort)
    pub scroll_into_view: bool,
}

impl ExternalLinkOptions {
    /// Default timings with the given same-context policy
    #[must_use]
    pub fn new(same_context: SameContextRestore) -> Self {
        Self {
            locator: LocatorOptions::default(),
            navigation: NavigationOptions::new(same_context),
            scroll_into_view: true,
        }
    }

    /// Set the locator options
    #[must_use]
    pub const fn with_locator(mut self, locator: LocatorOptions) -> Self {
        self.locator = locator;
        self
    }

    /// Set the navigation options
    #[must_use]
    pub const fn with_navigation(mut self, navigation: NavigationOptions) -> Self {
        self.navigation = navigation;
        self
    }

    /// Enable or disable scrolling before the click
    #[must_use]
    pub const fn with_scroll_into_view(mut self, scroll_into_view: bool) -> Self {
        self.scroll_into_view = scroll_into_view;
        self
    }

    fn trigger_name(&self) -> &'static str {
        if self.scroll_into_view {
            "scroll into view + click"
        } else {
            "click"
        }
    }
}

/// One link to check in a batch
#[derive(Debug, Clone)]
pub struct LinkCheck {
    /// Label used in reports
    pub name: String,
    /// How to find the link
    pub plan: LocatorPlan,
    /// Where it must lead
    pub expected: LocationPattern,
}

impl LinkCheck {
    /// Create a link check
    #[must_use]
    pub fn new(name: impl Into<String>, plan: LocatorPlan, expected: impl Into<LocationPattern>) -> Self {
        Self {
            name: name.into(),
            plan,
            expected: expected.into(),
        }
    }
}

/// Result of one link in a batch
#[derive(Debug)]
pub struct LinkReport {
    /// Label from the check
    pub name: String,
    /// Outcome or failure
    pub result: HarnessResult<NavigationOutcome>,
}

impl LinkReport {
    /// Whether the link led where expected
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Verifies that links lead to the expected external locations
#[derive(Debug)]
pub struct ExternalLinkVerifier<'b, B: Browser + ?Sized> {
    browser: &'b B,
}

impl<'b, B: Browser + ?Sized> ExternalLinkVerifier<'b, B> {
    /// Verifier over `browser`
    #[must_use]
    pub const fn new(browser: &'b B) -> Self {
        Self { browser }
    }

    /// Resolve `plan`, click it and require the destination to match `expected`
    ///
    /// The session is restored afterwards either way.
    ///
    /// # Errors
    ///
    /// [`HarnessError::InvalidConfig`] for an `expected` regex that does not
    /// compile, before anything is queried. Resolution errors as returned by
    /// [`LocatorResolver::resolve`](crate::locator::LocatorResolver::resolve);
    /// anything after that wrapped in [`HarnessError::ExternalLink`] naming
    /// the candidate and trigger.
    pub async fn verify_external_link(
        &self,
        plan: &LocatorPlan,
        expected: impl Into<LocationPattern>,
        options: &ExternalLinkOptions,
    ) -> HarnessResult<NavigationOutcome> {
        let expected = expected.into();
        expected.compile()?;
        let resolved = LocatorResolver::with_options(self.browser, options.locator)
            .resolve(plan)
            .await?;

        let browser = self.browser;
        let element = &resolved.element;
        let scroll = options.scroll_into_view;
        let outcome = WindowManager::new(browser)
            .with_external_navigation(
                move || activate(browser, element, scroll),
                expected.clone(),
                &options.navigation,
            )
            .await;

        match outcome {
            Ok(outcome) => {
                tracing::info!(
                    candidate = %resolved.selector,
                    location = %outcome.location(),
                    new_context = outcome.opened_new_context(),
                    "external link verified"
                );
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(
                    candidate = %resolved.selector,
                    expected = %expected,
                    error = %err,
                    "external link check failed"
                );
                Err(HarnessError::ExternalLink {
                    candidate: resolved.selector.to_string(),
                    trigger: options.trigger_name().to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    /// Run every check in order, collecting a report per link
    ///
    /// Failures do not stop the batch; each check restores the session
    /// before the next one starts.
    pub async fn verify_all(&self, checks: &[LinkCheck], options: &ExternalLinkOptions) -> Vec<LinkReport> {
        let mut reports = Vec::with_capacity(checks.len());
        for check in checks {
            let result = self
                .verify_external_link(&check.plan, check.expected.clone(), options)
                .await;
            reports.push(LinkReport {
                name: check.name.clone(),
                result,
            });
        }
        let failed = reports.iter().filter(|r| !r.passed()).count();
        tracing::info!(total = reports.len(), failed, "external link batch finished");
        reports
    }
}

async fn activate<B: Browser + ?Sized>(
    browser: &B,
    element: &ElementHandle,
    scroll: bool,
) -> HarnessResult<()> {
    if scroll {
        if let Err(err) = browser.act(element, &ElementAction::ScrollIntoView).await {
            tracing::debug!(element = %element.id, error = %err, "scroll into view failed, clicking anyway");
        }
    }
    browser.act(element, &ElementAction::Click).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::driver::ContextHandle;
    use crate::locator::Selector;
    use crate::mock::{LinkBehavior, MockBrowser, MockElement};
    use std::time::Duration;

    const HOME: &str = "https://www.saucedemo.com/inventory.html";

    fn options() -> ExternalLinkOptions {
        ExternalLinkOptions::new(SameContextRestore::NavigateBack)
            .with_locator(
                LocatorOptions::default()
                    .with_timeout(Duration::from_millis(500))
                    .with_poll_interval(Duration::from_millis(100)),
            )
            .with_navigation(
                NavigationOptions::new(SameContextRestore::NavigateBack)
                    .with_timeout(Duration::from_millis(1_000))
                    .with_poll_interval(Duration::from_millis(100)),
            )
    }

    fn social_footer() -> MockBrowser {
        let browser = MockBrowser::new(HOME);
        browser.add_element(
            MockElement::new("twitter", "a")
                .matching(Selector::css("a[data-test='social-twitter']"))
                .on_click(LinkBehavior::OpenContext {
                    url: "https://x.com/saucelabs".into(),
                }),
        );
        browser.add_element(
            MockElement::new("facebook", "a")
                .matching(Selector::link_text("Facebook"))
                .on_click(LinkBehavior::OpenContext {
                    url: "https://www.facebook.com/saucelabs".into(),
                }),
        );
        browser.add_element(
            MockElement::new("linkedin", "a")
                .matching(Selector::partial_link_text("LinkedIn"))
                .on_click(LinkBehavior::OpenContext {
                    url: "https://www.linkedin.com/company/sauce-labs/".into(),
                }),
        );
        browser
    }

    mod single_link_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_verifies_and_restores() {
            let browser = social_footer();
            let outcome = ExternalLinkVerifier::new(&browser)
                .verify_external_link(
                    &LocatorPlan::new(Selector::css("a[data-test='social-twitter']")),
                    "x.com",
                    &options(),
                )
                .await
                .unwrap();
            assert!(outcome.opened_new_context());
            assert_eq!(browser.contexts(), vec![ContextHandle::new("w1")]);
            assert_eq!(browser.active(), Some(ContextHandle::new("w1")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_scrolls_before_click() {
            let browser = social_footer();
            ExternalLinkVerifier::new(&browser)
                .verify_external_link(
                    &LocatorPlan::new(Selector::link_text("Facebook")),
                    LocationPattern::host("facebook.com"),
                    &options(),
                )
                .await
                .unwrap();
            let history = browser.history();
            let scroll = history.iter().position(|c| c == "act:scroll:facebook").unwrap();
            let click = history.iter().position(|c| c == "act:click:facebook").unwrap();
            assert!(scroll < click);
        }

        #[tokio::test(start_paused = true)]
        async fn test_scroll_can_be_disabled() {
            let browser = social_footer();
            ExternalLinkVerifier::new(&browser)
                .verify_external_link(
                    &LocatorPlan::new(Selector::link_text("Facebook")),
                    "facebook.com",
                    &options().with_scroll_into_view(false),
                )
                .await
                .unwrap();
            assert!(!browser.was_called("act:scroll"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_scroll_failure_is_tolerated() {
            let browser = MockBrowser::new(HOME);
            browser.add_element(
                MockElement::new("docs", "a")
                    .matching(Selector::text("Docs"))
                    .rejecting_scroll()
                    .on_click(LinkBehavior::OpenContext {
                        url: "https://docs.saucelabs.com/".into(),
                    }),
            );
            ExternalLinkVerifier::new(&browser)
                .verify_external_link(
                    &LocatorPlan::new(Selector::text("Docs")),
                    "docs.saucelabs.com",
                    &options(),
                )
                .await
                .unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_failure_names_candidate_trigger_and_locations() {
            let browser = social_footer();
            let plan = LocatorPlan::new(Selector::id("missing")).or(Selector::link_text("Facebook"));
            let err = ExternalLinkVerifier::new(&browser)
                .verify_external_link(&plan, "instagram.com", &options())
                .await
                .unwrap_err();
            match err {
                HarnessError::ExternalLink {
                    candidate,
                    trigger,
                    source,
                } => {
                    assert_eq!(candidate, "link=Facebook");
                    assert_eq!(trigger, "scroll into view + click");
                    match *source {
                        HarnessError::AssertionFailed { expected, actual } => {
                            assert!(expected.contains("instagram.com"));
                            assert_eq!(actual, "https://www.facebook.com/saucelabs");
                        }
                        other => panic!("expected AssertionFailed, got {other:?}"),
                    }
                }
                other => panic!("expected ExternalLink, got {other:?}"),
            }
            assert_eq!(browser.contexts(), vec![ContextHandle::new("w1")]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_unresolvable_link_is_not_found() {
            let browser = social_footer();
            let err = ExternalLinkVerifier::new(&browser)
                .verify_external_link(
                    &LocatorPlan::new(Selector::text("Instagram")),
                    "instagram.com",
                    &options(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, HarnessError::NotFound { .. }));
            assert!(!browser.was_called("act"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_bad_location_regex_rejected_before_lookup() {
            let browser = social_footer();
            let err = ExternalLinkVerifier::new(&browser)
                .verify_external_link(
                    &LocatorPlan::new(Selector::link_text("Facebook")),
                    LocationPattern::Regex(r"facebook\.com/(sauce".into()),
                    &options(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, HarnessError::InvalidConfig { .. }));
            assert!(!browser.was_called("find"));
            assert!(!browser.was_called("act"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_same_context_link_navigates_back() {
            let browser = MockBrowser::new(HOME);
            browser.add_element(
                MockElement::new("about", "a")
                    .matching(Selector::id("about_sidebar_link"))
                    .on_click(LinkBehavior::Navigate {
                        url: "https://saucelabs.com/".into(),
                    }),
            );
            let outcome = ExternalLinkVerifier::new(&browser)
                .verify_external_link(
                    &LocatorPlan::new(Selector::id("about_sidebar_link")),
                    "saucelabs.com",
                    &options(),
                )
                .await
                .unwrap();
            assert!(!outcome.opened_new_context());
            assert_eq!(browser.current_location().await.unwrap(), HOME);
        }
    }

    mod batch_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_verify_all_reports_each_link() {
            let browser = social_footer();
            let checks = vec![
                LinkCheck::new(
                    "twitter",
                    LocatorPlan::new(Selector::css("a[data-test='social-twitter']")),
                    "x.com",
                ),
                LinkCheck::new(
                    "facebook",
                    LocatorPlan::new(Selector::link_text("Facebook")),
                    "twitter.com",
                ),
                LinkCheck::new(
                    "linkedin",
                    LocatorPlan::new(Selector::partial_link_text("LinkedIn")),
                    LocationPattern::host("linkedin.com"),
                ),
            ];

            let reports = ExternalLinkVerifier::new(&browser)
                .verify_all(&checks, &options())
                .await;

            let passed: Vec<_> = reports.iter().map(LinkReport::passed).collect();
            assert_eq!(passed, vec![true, false, true]);
            assert_eq!(reports[1].name, "facebook");
            assert_eq!(browser.contexts(), vec![ContextHandle::new("w1")]);
            assert_eq!(browser.call_count("close:"), 3);
        }
    }
}
