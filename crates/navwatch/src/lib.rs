//! Navwatch: resilient browser-interaction harness
//!
//! Wraps any browser-control backend (see [`Browser`]) with the three things
//! flaky end-to-end suites keep re-implementing: bounded condition polling,
//! multi-candidate element location, and "click this link, check where it
//! went, then put every tab back" for links that may or may not open a new
//! browsing context.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    NAVWATCH Architecture                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────────────┐                                        │
//! │   │ExternalLinkVerifier│                                        │
//! │   └─────────┬──────────┘                                        │
//! │        ┌────┴─────────────┐                                     │
//! │   ┌────▼──────────┐ ┌─────▼────────┐   ┌────────┐   ┌─────────┐ │
//! │   │LocatorResolver│ │WindowManager │──►│ Waiter │──►│ Browser │ │
//! │   └────┬──────────┘ └──────────────┘   └────────┘   └─────────┘ │
//! │        └──────────────────────────────────▲                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use navwatch::{
//!     ExternalLinkOptions, ExternalLinkVerifier, LocatorPlan, MockBrowser,
//!     SameContextRestore, Selector,
//! };
//!
//! # async fn run() -> navwatch::HarnessResult<()> {
//! let browser = MockBrowser::new("https://shop.test/");
//! let plan = LocatorPlan::new(Selector::attribute("data-test", "social-twitter"))
//!     .or(Selector::link_text("Twitter"));
//!
//! ExternalLinkVerifier::new(&browser)
//!     .verify_external_link(
//!         &plan,
//!         "x.com",
//!         &ExternalLinkOptions::new(SameContextRestore::NavigateBack),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Harness configuration loaded from YAML and the environment
pub mod config;

/// Abstract browser-control surface
pub mod driver;

/// Location expectations
pub mod location;

/// Multi-candidate element location
pub mod locator;

/// In-memory browser for tests
pub mod mock;

mod result;

/// Log subscriber setup
pub mod tracing_support;

/// External link verification
pub mod verifier;

/// Condition polling
pub mod wait;

/// Browsing-context lifecycle
pub mod window;

pub use config::HarnessConfig;
pub use driver::{Browser, ContextHandle, ElementAction, ElementHandle};
pub use location::LocationPattern;
pub use locator::{Actionability, LocatorOptions, LocatorPlan, LocatorResolver, Resolved, Selector};
pub use mock::{LinkBehavior, MockBrowser, MockElement};
pub use result::{HarnessError, HarnessResult};
pub use tracing_support::{init_tracing, LogFormat};
pub use verifier::{ExternalLinkOptions, ExternalLinkVerifier, LinkCheck, LinkReport};
pub use wait::{wait_until, Check, Deadline, WaitOptions, Waiter};
pub use window::{NavigationOptions, NavigationOutcome, SameContextRestore, WindowManager};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        Browser, Check, ContextHandle, ExternalLinkOptions, ExternalLinkVerifier, HarnessConfig,
        HarnessError, HarnessResult, LocationPattern, LocatorOptions, LocatorPlan,
        LocatorResolver, NavigationOptions, NavigationOutcome, SameContextRestore, Selector,
        WaitOptions, Waiter, WindowManager,
    };
}
