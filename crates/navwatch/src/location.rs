//! Expectations on a browsing context's location.

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pattern a location must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationPattern {
    /// Exact URL match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Contains substring
    Contains(String),
    /// Regex match
    Regex(String),
    /// Glob pattern (e.g., "https://*.example.com/*")
    Glob(String),
    /// Host equals the domain or is a subdomain of it
    Host(String),
    /// Match any location
    Any,
}

impl LocationPattern {
    /// Substring match
    #[must_use]
    pub fn contains(fragment: impl Into<String>) -> Self {
        Self::Contains(fragment.into())
    }

    /// Host match
    #[must_use]
    pub fn host(domain: impl Into<String>) -> Self {
        Self::Host(domain.into())
    }

    /// Check if a location matches this pattern
    ///
    /// An invalid regex never matches; [`compile`](Self::compile) reports it.
    #[must_use]
    pub fn matches(&self, location: &str) -> bool {
        match self {
            Self::Exact(pattern) => location == pattern,
            Self::Prefix(pattern) => location.starts_with(pattern.as_str()),
            Self::Contains(pattern) => location.contains(pattern.as_str()),
            Self::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(location))
                .unwrap_or(false),
            Self::Glob(pattern) => glob_matches(pattern, location),
            Self::Host(domain) => host_matches(domain, location),
            Self::Any => true,
        }
    }

    /// Check the pattern once so it can be matched repeatedly
    ///
    /// # Errors
    ///
    /// [`HarnessError::InvalidConfig`] for a regex that does not compile.
    pub fn compile(&self) -> HarnessResult<CompiledPattern> {
        let regex = match self {
            Self::Regex(pattern) => Some(regex::Regex::new(pattern).map_err(|e| {
                HarnessError::invalid_config(format!("location regex /{pattern}/: {e}"))
            })?),
            _ => None,
        };
        Ok(CompiledPattern {
            pattern: self.clone(),
            regex,
        })
    }
}

/// A [`LocationPattern`] whose regex, if any, is already compiled
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pattern: LocationPattern,
    regex: Option<regex::Regex>,
}

impl CompiledPattern {
    /// The source pattern
    #[must_use]
    pub const fn pattern(&self) -> &LocationPattern {
        &self.pattern
    }

    /// Check if a location matches
    #[must_use]
    pub fn matches(&self, location: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(location),
            None => self.pattern.matches(location),
        }
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pattern.fmt(f)
    }
}

/// `*` glob matching; the first and last literal parts are anchored
fn glob_matches(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let Some((last, init)) = parts.split_last() else {
        return text.is_empty();
    };
    let Some((first, middle)) = init.split_first() else {
        return pattern == text;
    };

    let Some(rest) = text.strip_prefix(first) else {
        return false;
    };
    let Some(mut body) = rest.strip_suffix(last) else {
        return false;
    };
    for part in middle.iter().filter(|p| !p.is_empty()) {
        match body.find(part) {
            Some(found) => body = &body[found + part.len()..],
            None => return false,
        }
    }
    true
}

fn host_matches(domain: &str, location: &str) -> bool {
    let domain = domain.trim_start_matches("www.").to_ascii_lowercase();
    url::Url::parse(location)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| {
            let host = host.trim_start_matches("www.");
            host == domain || host.ends_with(&format!(".{domain}"))
        })
}

impl fmt::Display for LocationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) => write!(f, "equal to {p:?}"),
            Self::Prefix(p) => write!(f, "starting with {p:?}"),
            Self::Contains(p) => write!(f, "containing {p:?}"),
            Self::Regex(p) => write!(f, "matching /{p}/"),
            Self::Glob(p) => write!(f, "matching glob {p:?}"),
            Self::Host(d) => write!(f, "on host {d:?}"),
            Self::Any => write!(f, "any location"),
        }
    }
}

impl From<&str> for LocationPattern {
    fn from(fragment: &str) -> Self {
        Self::Contains(fragment.to_string())
    }
}

impl From<String> for LocationPattern {
    fn from(fragment: String) -> Self {
        Self::Contains(fragment)
    }
}

/// Location of a fresh context that has not committed a navigation yet
#[must_use]
pub fn is_blank(location: &str) -> bool {
    location.is_empty() || location == "about:blank"
}
