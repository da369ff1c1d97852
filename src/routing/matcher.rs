//! Route pattern matching.
//!
//! # Responsibilities
//! - Parse route patterns: exact paths or prefix wildcards ("/api/sbom/*")
//! - Resolve the best rule for a (method, path) pair
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Exact patterns always beat wildcards
//! - Among wildcards, the longest prefix wins; ties go to the rule declared first
//! - A rule scoped to the request method beats an unscoped one of equal length
//! - No regex to guarantee O(n) matching

use axum::http::Method;

/// Marker that turns a pattern into a prefix wildcard.
pub const WILDCARD: char = '*';

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches one path exactly.
    Exact(String),
    /// Matches every path starting with the prefix.
    Prefix(String),
}

impl PathPattern {
    /// Parse a pattern. A trailing `*` makes it a prefix wildcard.
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix(WILDCARD) {
            Some(prefix) => PathPattern::Prefix(prefix.to_string()),
            None => PathPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(exact) => exact == path,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, PathPattern::Prefix(_))
    }

    /// Number of literal characters the pattern pins down.
    pub fn specificity(&self) -> usize {
        match self {
            PathPattern::Exact(p) | PathPattern::Prefix(p) => p.len(),
        }
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathPattern::Exact(p) => write!(f, "{}", p),
            PathPattern::Prefix(p) => write!(f, "{}{}", p, WILDCARD),
        }
    }
}

/// One entry of a [`PatternTable`].
#[derive(Debug, Clone)]
pub struct PatternRule<T> {
    pub pattern: PathPattern,
    /// Methods the rule is scoped to; empty means any method.
    pub methods: Vec<Method>,
    pub value: T,
}

impl<T> PatternRule<T> {
    fn applies_to(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

/// Ordered table of pattern rules, immutable once built.
#[derive(Debug, Clone)]
pub struct PatternTable<T> {
    rules: Vec<PatternRule<T>>,
}

impl<T> Default for PatternTable<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T> PatternTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; declaration order breaks ties.
    pub fn push(&mut self, pattern: PathPattern, methods: Vec<Method>, value: T) {
        self.rules.push(PatternRule { pattern, methods, value });
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the best rule for the request, or `None` when nothing matches.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<&PatternRule<T>> {
        let mut best: Option<(&PatternRule<T>, (bool, usize, bool))> = None;

        for rule in &self.rules {
            if !rule.applies_to(method) || !rule.pattern.matches(path) {
                continue;
            }
            let rank = (
                !rule.pattern.is_wildcard(),
                rule.pattern.specificity(),
                !rule.methods.is_empty(),
            );
            // Strictly greater keeps the earliest declaration on ties.
            if best.as_ref().map_or(true, |(_, current)| rank > *current) {
                best = Some((rule, rank));
            }
        }

        best.map(|(rule, _)| rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_parse() {
        assert_eq!(
            PathPattern::parse("/api/sbom/*"),
            PathPattern::Prefix("/api/sbom/".into())
        );
        assert_eq!(
            PathPattern::parse("/api/auth/login"),
            PathPattern::Exact("/api/auth/login".into())
        );
        assert_eq!(PathPattern::parse("/api/sbom/*").to_string(), "/api/sbom/*");
    }

    #[test]
    fn test_prefix_matching() {
        let pattern = PathPattern::parse("/api/sbom/*");
        assert!(pattern.matches("/api/sbom/upload"));
        assert!(pattern.matches("/api/sbom/"));
        assert!(!pattern.matches("/api/sbomx"));
        assert!(!pattern.matches("/API/sbom/upload")); // Case sensitive
    }

    #[test]
    fn test_exact_beats_wildcard() {
        let mut table = PatternTable::new();
        table.push(PathPattern::parse("/api/billing/*"), vec![], "wildcard");
        table.push(PathPattern::parse("/api/billing/webhook"), vec![], "exact");

        let hit = table.lookup(&Method::POST, "/api/billing/webhook").unwrap();
        assert_eq!(hit.value, "exact");
        let hit = table.lookup(&Method::POST, "/api/billing/plans").unwrap();
        assert_eq!(hit.value, "wildcard");
    }

    #[test]
    fn test_longest_prefix_wins_regardless_of_order() {
        let mut table = PatternTable::new();
        table.push(PathPattern::parse("/api/*"), vec![], "broad");
        table.push(PathPattern::parse("/api/report/*"), vec![], "specific");

        let hit = table.lookup(&Method::GET, "/api/report/7").unwrap();
        assert_eq!(hit.value, "specific");
        let hit = table.lookup(&Method::GET, "/api/risk/score").unwrap();
        assert_eq!(hit.value, "broad");
    }

    #[test]
    fn test_ties_go_to_first_declared() {
        let mut table = PatternTable::new();
        table.push(PathPattern::parse("/api/report/*"), vec![], "first");
        table.push(PathPattern::parse("/api/report/*"), vec![], "second");

        assert_eq!(table.lookup(&Method::GET, "/api/report/1").unwrap().value, "first");
    }

    #[test]
    fn test_method_scoped_rule() {
        let mut table = PatternTable::new();
        table.push(PathPattern::parse("/api/report/*"), vec![], "any");
        table.push(PathPattern::parse("/api/report/*"), vec![Method::DELETE], "delete");

        assert_eq!(table.lookup(&Method::DELETE, "/api/report/1").unwrap().value, "delete");
        assert_eq!(table.lookup(&Method::GET, "/api/report/1").unwrap().value, "any");
    }

    #[test]
    fn test_no_match() {
        let mut table = PatternTable::new();
        table.push(PathPattern::parse("/api/sbom/*"), vec![], ());
        assert!(table.lookup(&Method::GET, "/api/unknown").is_none());
    }
}
