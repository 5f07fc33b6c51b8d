//! Domain blocking rules with pre-compiled pattern matching.
//!
//! Supports exact domain rules and wildcard rules (*.example.com).
//! Patterns are normalized once at construction so the per-packet
//! lookup does no string surgery beyond one lowercase copy.

use std::collections::HashSet;

/// One domain-blocking directive, as stored by the blocklist owner.
///
/// An exact rule for `youtube.com` blocks `youtube.com` and its `www`
/// alias. A wildcard rule with base `youtube.com` blocks the base domain
/// and every subdomain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRule {
    pattern: String,
    wildcard: bool,
}

impl BlockRule {
    /// Create an exact-match rule.
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: normalize(&pattern.into()),
            wildcard: false,
        }
    }

    /// Create a wildcard rule from its base domain.
    pub fn wildcard(base: impl Into<String>) -> Self {
        Self {
            pattern: normalize(&base.into()),
            wildcard: true,
        }
    }

    /// Parse a rule from its textual form.
    ///
    /// A leading `*.` marks a wildcard rule; anything else is an exact
    /// rule. Returns `None` for patterns that are empty after
    /// normalization (e.g. `"*."` or whitespace).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (pattern, wildcard) = match trimmed.strip_prefix("*.") {
            Some(base) => (base, true),
            None => (trimmed, false),
        };
        let pattern = normalize(pattern);
        if pattern.is_empty() {
            return None;
        }
        Some(Self { pattern, wildcard })
    }

    /// The normalized pattern (wildcard base has no `*.` prefix).
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether this rule also matches all subdomains of its pattern.
    pub const fn is_wildcard(&self) -> bool {
        self.wildcard
    }
}

fn normalize(pattern: &str) -> String {
    pattern.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// A compiled rule snapshot for per-query lookups.
///
/// Exact patterns live in a hash set for O(1) lookups; wildcard rules are
/// stored as dotted suffixes (`.youtube.com`) so a match is a single
/// `ends_with` per rule.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    exact: HashSet<String>,
    wildcard_suffixes: Vec<String>,
}

impl RuleSet {
    /// Compile a snapshot of rules.
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = BlockRule>,
    {
        let mut exact = HashSet::new();
        let mut wildcard_suffixes = Vec::new();

        for rule in rules {
            if rule.pattern.is_empty() {
                continue;
            }
            if rule.wildcard {
                wildcard_suffixes.push(format!(".{}", rule.pattern));
            } else {
                exact.insert(rule.pattern);
            }
        }

        Self {
            exact,
            wildcard_suffixes,
        }
    }

    /// Check whether a hostname is blocked by any rule.
    ///
    /// Exact rules match the pattern itself and its `www.` alias, so
    /// registering the bare domain also covers the common browser form.
    /// Wildcard rules match their base domain and every subdomain.
    #[inline]
    pub fn is_blocked(&self, hostname: &str) -> bool {
        let normalized = hostname.trim().to_ascii_lowercase();
        let host = normalized.trim_end_matches('.');

        if self.exact.contains(host) {
            return true;
        }
        if let Some(bare) = host.strip_prefix("www.") {
            if self.exact.contains(bare) {
                return true;
            }
        }

        for suffix in &self.wildcard_suffixes {
            // `.base` suffix match covers subdomains; the bare base is
            // the suffix minus its leading dot.
            if host.ends_with(suffix.as_str()) || host == &suffix[1..] {
                return true;
            }
        }

        false
    }

    /// Check whether the snapshot has any rules.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard_suffixes.is_empty()
    }

    /// Returns the total number of compiled rules.
    #[inline]
    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcard_suffixes.len()
    }
}
