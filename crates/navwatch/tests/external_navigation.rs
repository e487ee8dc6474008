//! End-to-end scenarios through the public API
//!
//! Every test runs on a paused tokio clock, so timeouts elapse instantly and
//! timing assertions are exact.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use navwatch::prelude::*;
use navwatch::{ElementAction, LinkBehavior, LinkCheck, MockBrowser, MockElement};
use std::time::Duration;
use tokio::time::Instant;

const HOME: &str = "https://www.saucedemo.com/inventory.html";

fn config() -> HarnessConfig {
    HarnessConfig::new()
        .with_timeout_ms(2_000)
        .with_poll_interval_ms(100)
}

async fn click(browser: &MockBrowser, id: &str) -> HarnessResult<()> {
    let resolved = LocatorResolver::new(browser)
        .resolve(&LocatorPlan::new(Selector::id(id)))
        .await?;
    browser.act(&resolved.element, &ElementAction::Click).await
}

// ============================================================================
// Scenario A: link opens a new context at the expected location
// ============================================================================

#[tokio::test(start_paused = true)]
async fn scenario_a_new_context_matches_and_original_restored() {
    let browser = MockBrowser::new(HOME);
    browser.add_element(
        MockElement::new("ext", "a")
            .matching(Selector::id("ext"))
            .on_click(LinkBehavior::OpenContext {
                url: "https://example.com/page".into(),
            }),
    );
    let before = browser.list_contexts().await.unwrap();
    let original = browser.active_context().await.unwrap();

    let outcome = WindowManager::new(&browser)
        .with_external_navigation(
            || click(&browser, "ext"),
            "example.com",
            &config().navigation_options(SameContextRestore::Stay),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, NavigationOutcome::NewContext { .. }));
    assert_eq!(outcome.location(), "https://example.com/page");
    assert_eq!(browser.list_contexts().await.unwrap(), before);
    assert_eq!(browser.active_context().await.unwrap(), original);
}

// ============================================================================
// Scenario B: same-context navigation to the wrong place
// ============================================================================

#[tokio::test(start_paused = true)]
async fn scenario_b_same_context_mismatch_is_assertion_failure() {
    let browser = MockBrowser::new(HOME);
    browser.add_element(
        MockElement::new("ext", "a")
            .matching(Selector::id("ext"))
            .on_click(LinkBehavior::Navigate {
                url: "https://other.org/landing".into(),
            }),
    );

    let err = WindowManager::new(&browser)
        .with_external_navigation(
            || click(&browser, "ext"),
            "example.com",
            &config().navigation_options(SameContextRestore::NavigateBack),
        )
        .await
        .unwrap_err();

    match err {
        HarnessError::AssertionFailed { expected, actual } => {
            assert!(expected.contains("example.com"));
            assert_eq!(actual, "https://other.org/landing");
        }
        other => panic!("expected AssertionFailed, got {other:?}"),
    }
    assert_eq!(browser.current_location().await.unwrap(), HOME);
}

// ============================================================================
// Scenario C: fallback candidate locates the element
// ============================================================================

#[tokio::test(start_paused = true)]
async fn scenario_c_second_candidate_resolves() {
    let browser = MockBrowser::new(HOME);
    browser.add_element(
        MockElement::new("submit", "button")
            .matching(Selector::text("Submit"))
            .with_text("Submit"),
    );
    let plan = LocatorPlan::new(Selector::attribute("data-test", "x")).or(Selector::text("Submit"));

    let resolved = LocatorResolver::with_options(&browser, config().locator_options())
        .resolve(&plan)
        .await
        .unwrap();

    assert_eq!(resolved.candidate_index, 1);
    assert_eq!(resolved.element.id, "submit");
    assert_eq!(resolved.element.text_content.as_deref(), Some("Submit"));
}

// ============================================================================
// Scenario D: trigger changes nothing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn scenario_d_no_navigation_occurred() {
    let browser = MockBrowser::new(HOME);
    browser.add_element(MockElement::new("dead", "a").matching(Selector::id("dead")));

    let start = Instant::now();
    let err = WindowManager::new(&browser)
        .with_external_navigation(
            || click(&browser, "dead"),
            "example.com",
            &config().navigation_options(SameContextRestore::Stay),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::NoNavigationOccurred { .. }));
    assert!(start.elapsed() >= Duration::from_millis(2_000));
    assert_eq!(browser.contexts().len(), 1);
}

// ============================================================================
// Restoration invariants
// ============================================================================

#[tokio::test(start_paused = true)]
async fn restoration_holds_on_success_and_failure() {
    let browser = MockBrowser::new(HOME);
    browser.open_context("https://docs.saucelabs.com/");
    browser.add_element(
        MockElement::new("good", "a")
            .matching(Selector::id("good"))
            .on_click(LinkBehavior::OpenContext {
                url: "https://example.com/".into(),
            }),
    );
    browser.add_element(
        MockElement::new("bad", "a")
            .matching(Selector::id("bad"))
            .on_click(LinkBehavior::OpenContextLoading {
                url: "https://wrong.example.org/".into(),
                load_after: Duration::from_millis(300),
            }),
    );
    let before = browser.list_contexts().await.unwrap();
    let original = browser.active_context().await.unwrap();
    let manager = WindowManager::new(&browser);
    let options = config().navigation_options(SameContextRestore::Stay);

    manager
        .with_external_navigation(|| click(&browser, "good"), "example.com", &options)
        .await
        .unwrap();
    assert_eq!(browser.list_contexts().await.unwrap(), before);
    assert_eq!(browser.active_context().await.unwrap(), original);

    let err = manager
        .with_external_navigation(
            || click(&browser, "bad"),
            LocationPattern::Exact("https://example.com/".into()),
            &options,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::AssertionFailed { .. }));
    assert_eq!(browser.list_contexts().await.unwrap(), before);
    assert_eq!(browser.active_context().await.unwrap(), original);
}

#[tokio::test(start_paused = true)]
async fn verifier_batch_over_footer_links() {
    let browser = MockBrowser::new(HOME);
    for (id, text, url) in [
        ("twitter", "Twitter", "https://x.com/saucelabs"),
        ("facebook", "Facebook", "https://www.facebook.com/saucelabs"),
        ("linkedin", "LinkedIn", "https://www.linkedin.com/company/sauce-labs/"),
    ] {
        browser.add_element(
            MockElement::new(id, "a")
                .matching(Selector::attribute("data-test", format!("social-{id}")))
                .matching(Selector::link_text(text))
                .on_click(LinkBehavior::OpenContextAfter {
                    url: url.into(),
                    delay: Duration::from_millis(150),
                }),
        );
    }

    let checks: Vec<LinkCheck> = [
        ("twitter", "Twitter", "x.com"),
        ("facebook", "Facebook", "facebook.com"),
        ("linkedin", "LinkedIn", "linkedin.com"),
    ]
    .into_iter()
    .map(|(id, text, host)| {
        LinkCheck::new(
            id,
            LocatorPlan::new(Selector::attribute("data-test", format!("social-{id}")))
                .or(Selector::link_text(text)),
            LocationPattern::host(host),
        )
    })
    .collect();

    let reports = ExternalLinkVerifier::new(&browser)
        .verify_all(&checks, &config().external_link_options(SameContextRestore::NavigateBack))
        .await;

    assert!(reports.iter().all(|r| r.passed()), "{reports:?}");
    assert_eq!(browser.contexts().len(), 1);
}
