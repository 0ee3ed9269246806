//! Path exclusions: request paths exempt from authentication.
//!
//! Exact paths live in a hash set and are checked first. Wildcard patterns are
//! then tried in declaration order, first match wins, so operators control
//! precedence by listing the more specific patterns first.
//!
//! Pattern syntax works on `/`-separated segments:
//!
//! - `/health` matches exactly `/health`.
//! - `/api/*/health` matches one arbitrary non-empty segment in place of `*`
//!   (`/api/v2/health` but not `/api/v2/v3/health`).
//! - `/static/**` matches `/static` and anything below it. `**` is only
//!   allowed as the final segment; the segments before it may themselves be
//!   literals or `*`.

use std::collections::HashSet;

use crate::error::ConfigurationError;

/// How a compiled [`PathPattern`] matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// A full literal path.
    Exact,
    /// One or more `*` segments, each standing for exactly one path segment.
    SingleWildcardSegment,
    /// Ends in `**`, matching zero or more trailing segments.
    MultiWildcardSuffix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

impl Segment {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == candidate,
            Segment::Any => !candidate.is_empty(),
        }
    }
}

/// A compiled path exclusion rule. Immutable once compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    kind: PatternKind,
    /// For `MultiWildcardSuffix`, the segments before the trailing `**`.
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern, rejecting blank patterns, patterns that would exclude
    /// every path, and wildcards that do not span a whole segment.
    pub fn compile(pattern: &str) -> Result<Self, ConfigurationError> {
        let raw = pattern.trim();
        let invalid = |reason| ConfigurationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if raw.is_empty() {
            return Err(invalid("pattern is blank"));
        }
        if raw.chars().all(|c| matches!(c, '/' | '*' | ' ')) {
            return Err(invalid("pattern would exclude all paths"));
        }

        if !raw.contains('*') {
            return Ok(Self {
                raw: raw.to_string(),
                kind: PatternKind::Exact,
                segments: Vec::new(),
            });
        }

        let parts: Vec<&str> = raw.split('/').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());
        let mut kind = PatternKind::SingleWildcardSegment;

        for (i, part) in parts.iter().enumerate() {
            match *part {
                "**" if i == last => kind = PatternKind::MultiWildcardSuffix,
                "**" => return Err(invalid("'**' is only allowed as the final segment")),
                "*" => segments.push(Segment::Any),
                other if other.contains('*') => {
                    return Err(invalid("wildcards must span a whole path segment"))
                }
                other => segments.push(Segment::Literal(other.to_string())),
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            kind,
            segments,
        })
    }

    /// The pattern as written (trimmed).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind != PatternKind::Exact
    }

    /// Whether `path` matches this pattern. Blank paths never match.
    pub fn matches(&self, path: &str) -> bool {
        if path.trim().is_empty() {
            return false;
        }
        match self.kind {
            PatternKind::Exact => self.raw == path,
            PatternKind::SingleWildcardSegment => {
                let mut parts = path.split('/');
                for segment in &self.segments {
                    match parts.next() {
                        Some(part) if segment.matches(part) => {}
                        _ => return false,
                    }
                }
                parts.next().is_none()
            }
            PatternKind::MultiWildcardSuffix => {
                let mut parts = path.split('/');
                self.segments
                    .iter()
                    .all(|segment| parts.next().is_some_and(|part| segment.matches(part)))
            }
        }
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The set of path exclusions. Built once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    exact: HashSet<String>,
    wildcards: Vec<PathPattern>,
}

impl ExclusionSet {
    /// Compile every pattern, failing on the first invalid one.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for pattern in patterns {
            let compiled = PathPattern::compile(pattern.as_ref())?;
            if compiled.is_wildcard() {
                set.wildcards.push(compiled);
            } else {
                set.exact.insert(compiled.raw);
            }
        }
        Ok(set)
    }

    /// Parse a comma-separated list of patterns, skipping blank entries.
    pub fn parse_list(raw: &str) -> Result<Self, ConfigurationError> {
        Self::new(raw.split(',').filter(|p| !p.trim().is_empty()))
    }

    /// An exclusion set that excludes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether `path` is exempt from authentication.
    pub fn is_excluded(&self, path: &str) -> bool {
        if self.exact.contains(path) {
            return true;
        }
        self.wildcards.iter().any(|pattern| pattern.matches(path))
    }

    /// The wildcard pattern that excludes `path`, if any.
    pub fn matching_wildcard(&self, path: &str) -> Option<&PathPattern> {
        self.wildcards.iter().find(|pattern| pattern.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcards.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcards.len()
    }

    /// Wildcard patterns in evaluation order.
    pub fn wildcards(&self) -> &[PathPattern] {
        &self.wildcards
    }
}
