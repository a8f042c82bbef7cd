//! Target pattern matching.
//!
//! Resource and action patterns are either literal strings or regular
//! expressions. A pattern matches a value when the two are equal, or when
//! the pattern, read as a regex, matches the *whole* value.
//!
//! Patterns are compiled once on construction and the compiled form is kept
//! next to the source string, so matching never recompiles.
//!
//! # Example
//!
//! ```ignore
//! use esoe_core::TargetPattern;
//!
//! let pattern = TargetPattern::new("/admin/.*");
//! assert!(pattern.matches("/admin/index.html"));
//! assert!(!pattern.matches("/public/admin/index.html"));
//! ```

use regex::Regex;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A precompiled resource or action pattern.
#[derive(Debug, Clone)]
pub struct TargetPattern {
    source: String,
    regex: Option<Regex>,
}

impl TargetPattern {
    /// Compile a pattern.
    ///
    /// A source that is not a valid regular expression is kept and only
    /// matches by literal equality.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let regex = match Regex::new(&format!("^(?:{source})$")) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(
                    pattern = %source,
                    error = %e,
                    "Target pattern is not a valid regex, matching literally"
                );
                None
            }
        };

        Self { source, regex }
    }

    /// The pattern as it was declared.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the source compiled as a regular expression.
    #[must_use]
    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Test a value against this pattern.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        if self.source == value {
            return true;
        }

        self.regex.as_ref().is_some_and(|re| re.is_match(value))
    }
}

impl PartialEq for TargetPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for TargetPattern {}

impl Hash for TargetPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Display for TargetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for TargetPattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Match a requested action against an optional action pattern.
///
/// An absent pattern only matches an absent action, and an absent action is
/// only matched by an absent pattern.
#[must_use]
pub fn action_matches(pattern: Option<&TargetPattern>, action: Option<&str>) -> bool {
    match (pattern, action) {
        (None, None) => true,
        (Some(pattern), Some(action)) => pattern.matches(action),
        _ => false,
    }
}

// =============================================================================
// Tests
// =============================================================================
