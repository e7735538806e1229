//! Scope type, validation, and pattern matching
//!
//! A scope is a dot-delimited hierarchy identifying an organizational
//! boundary: `acme.corp.engineering`. Patterns may additionally use `*`
//! (exactly one segment) and `**` (zero or more segments) at any position.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthzError, Result};

/// Maximum number of segments in a scope
pub const MAX_SCOPE_DEPTH: usize = 10;

/// Sentinel reported in inheritance chains when resolution falls back to
/// the unscoped (global) policy set
pub const GLOBAL_SCOPE: &str = "(global)";

/// A validated, concrete (wildcard-free) scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope {
    raw: String,
    segments: Vec<String>,
}

impl Scope {
    /// Parse and validate a concrete scope
    ///
    /// The empty string is the global scope and is valid. Each segment
    /// must be non-empty and drawn from `[A-Za-z0-9_-]`; wildcards are
    /// rejected here - they belong to patterns, not scopes.
    pub fn parse(s: &str) -> Result<Self> {
        validate_scope(s)?;
        Ok(Self {
            raw: s.to_string(),
            segments: split_segments(s),
        })
    }

    /// The scope's segments, most significant first
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The raw scope string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True for the global (empty) scope
    pub fn is_global(&self) -> bool {
        self.segments.is_empty()
    }

    /// The parent scope, if this scope has one
    ///
    /// `acme.corp` -> `acme`; a single-segment scope has the global scope
    /// as parent; the global scope has none.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let parent_segments = &self.segments[..self.segments.len() - 1];
        Some(Self {
            raw: parent_segments.join("."),
            segments: parent_segments.to_vec(),
        })
    }

    /// True when `self` is a strict ancestor of `other`
    pub fn is_ancestor_of(&self, other: &Scope) -> bool {
        self.segments.len() < other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }
}

impl FromStr for Scope {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Scope {
    type Error = AuthzError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.raw
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Split a scope string into segments; the empty string has none
fn split_segments(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('.').map(|seg| seg.to_string()).collect()
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validate a concrete scope: depth limit, segment charset, no wildcards
///
/// Enforced at policy-load time; requests against invalid scopes must
/// never reach resolution.
pub fn validate_scope(scope: &str) -> Result<()> {
    if scope.is_empty() {
        return Ok(());
    }

    let segments: Vec<&str> = scope.split('.').collect();
    if segments.len() > MAX_SCOPE_DEPTH {
        return Err(AuthzError::ScopeValidation(format!(
            "scope '{}' exceeds maximum depth of {}",
            scope, MAX_SCOPE_DEPTH
        )));
    }

    for segment in segments {
        if !is_valid_segment(segment) {
            return Err(AuthzError::ScopeValidation(format!(
                "invalid scope segment '{}' in '{}'",
                segment, scope
            )));
        }
    }

    Ok(())
}

/// Validate a scope pattern: like [`validate_scope`] but `*` and `**`
/// are permitted as standalone segments at any position
pub fn validate_scope_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(AuthzError::ScopeValidation(
            "scope pattern cannot be empty".to_string(),
        ));
    }

    let segments: Vec<&str> = pattern.split('.').collect();
    if segments.len() > MAX_SCOPE_DEPTH {
        return Err(AuthzError::ScopeValidation(format!(
            "scope pattern '{}' exceeds maximum depth of {}",
            pattern, MAX_SCOPE_DEPTH
        )));
    }

    for segment in segments {
        if segment == "*" || segment == "**" {
            continue;
        }
        if segment.contains('*') {
            return Err(AuthzError::ScopeValidation(format!(
                "wildcards must be standalone segments: '{}' in '{}'",
                segment, pattern
            )));
        }
        if !is_valid_segment(segment) {
            return Err(AuthzError::ScopeValidation(format!(
                "invalid pattern segment '{}' in '{}'",
                segment, pattern
            )));
        }
    }

    Ok(())
}

/// Match a scope pattern against a concrete scope
///
/// Exact equality always matches. Pattern segments are literals (exact
/// match), `*` (exactly one segment), or `**` (zero or more segments,
/// usable at the start, middle, or end). Examples:
///
/// ```
/// use keystone_authz::scope::match_scope;
///
/// assert!(match_scope("acme.corp", "acme.corp"));
/// assert!(match_scope("acme.*", "acme.corp"));
/// assert!(!match_scope("acme.*", "acme.corp.eng"));
/// assert!(match_scope("acme.**", "acme.corp.eng.team1"));
/// assert!(match_scope("acme.**", "acme"));
/// assert!(match_scope("**.engineering", "acme.corp.engineering"));
/// assert!(match_scope("acme.**.team1", "acme.corp.eng.team1"));
/// ```
pub fn match_scope(pattern: &str, scope: &str) -> bool {
    if pattern == scope {
        return true;
    }

    let pattern_segments: Vec<&str> = if pattern.is_empty() {
        Vec::new()
    } else {
        pattern.split('.').collect()
    };
    let scope_segments: Vec<&str> = if scope.is_empty() {
        Vec::new()
    } else {
        scope.split('.').collect()
    };

    match_segments(&pattern_segments, &scope_segments)
}

/// Segment-wise matcher; `**` backtracks over zero or more segments
///
/// Worst case is exponential in pattern length, but the depth cap keeps
/// inputs at most [`MAX_SCOPE_DEPTH`] segments.
fn match_segments(pattern: &[&str], scope: &[&str]) -> bool {
    match pattern.split_first() {
        None => scope.is_empty(),
        Some((&"**", rest)) => {
            // Zero segments consumed, or one and retry.
            match_segments(rest, scope)
                || (!scope.is_empty() && match_segments(pattern, &scope[1..]))
        }
        Some((&"*", rest)) => !scope.is_empty() && match_segments(rest, &scope[1..]),
        Some((literal, rest)) => {
            scope.first() == Some(literal) && match_segments(rest, &scope[1..])
        }
    }
}
