use gatehouse_security::error::ConfigurationError;
use gatehouse_security::exclusion::{ExclusionSet, PathPattern, PatternKind};

// ── PathPattern ──

#[test]
fn single_wildcard_matches_one_segment() {
    let pattern = PathPattern::compile("/api/*/health").unwrap();
    assert_eq!(pattern.kind(), PatternKind::SingleWildcardSegment);
    assert!(pattern.matches("/api/v2/health"));
    assert!(!pattern.matches("/api/v2/v3/health"));
    assert!(!pattern.matches("/api//health"));
    assert!(!pattern.matches("/api/v2/status"));
}

#[test]
fn multi_wildcard_matches_any_suffix() {
    let pattern = PathPattern::compile("/static/**").unwrap();
    assert_eq!(pattern.kind(), PatternKind::MultiWildcardSuffix);
    assert!(pattern.matches("/static/a/b/c"));
    assert!(pattern.matches("/static/app.js"));
    assert!(pattern.matches("/static"));
    assert!(!pattern.matches("/staticfiles/app.js"));
    assert!(!pattern.matches("/api/static/app.js"));
}

#[test]
fn multi_wildcard_after_single_wildcard() {
    let pattern = PathPattern::compile("/tenants/*/public/**").unwrap();
    assert!(pattern.matches("/tenants/acme/public/logo.png"));
    assert!(!pattern.matches("/tenants/acme/private/logo.png"));
}

#[test]
fn exact_pattern_is_literal() {
    let pattern = PathPattern::compile(" /health ").unwrap();
    assert_eq!(pattern.kind(), PatternKind::Exact);
    assert_eq!(pattern.as_str(), "/health");
    assert!(pattern.matches("/health"));
    assert!(!pattern.matches("/health/"));
    assert!(!pattern.is_wildcard());
}

#[test]
fn blank_pattern_is_rejected() {
    let err = PathPattern::compile("   ").unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidPattern { .. }));
}

#[test]
fn catch_all_patterns_are_rejected() {
    for pattern in ["/*", "/**", "*", "/ * /", "**"] {
        let err = PathPattern::compile(pattern).unwrap_err();
        assert!(
            matches!(err, ConfigurationError::InvalidPattern { .. }),
            "expected {pattern:?} to be rejected"
        );
    }
}

#[test]
fn double_star_must_be_last() {
    let err = PathPattern::compile("/api/**/health").unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidPattern { .. }));
}

#[test]
fn partial_segment_wildcard_is_rejected() {
    let err = PathPattern::compile("/api/v*/health").unwrap_err();
    assert!(err.to_string().contains("/api/v*/health"));
}

#[test]
fn blank_path_never_matches() {
    let pattern = PathPattern::compile("/static/**").unwrap();
    assert!(!pattern.matches(""));
    assert!(!pattern.matches("  "));
}

// ── ExclusionSet ──

#[test]
fn exact_and_wildcard_exclusions() {
    let set = ExclusionSet::new(["/health", "/static/**", "/api/*/status"]).unwrap();
    assert_eq!(set.len(), 3);
    assert!(set.is_excluded("/health"));
    assert!(set.is_excluded("/static/js/app.js"));
    assert!(set.is_excluded("/api/v1/status"));
    assert!(!set.is_excluded("/api/users"));
    assert!(!set.is_excluded("/healthz"));
}

#[test]
fn exact_match_holds_regardless_of_wildcards() {
    let exact_only = ExclusionSet::new(["/metrics"]).unwrap();
    let with_wildcards = ExclusionSet::new(["/metrics", "/api/*/x", "/assets/**"]).unwrap();
    for path in ["/metrics", "/metrics/", "/Metrics", "/metric"] {
        assert_eq!(
            exact_only.is_excluded(path),
            path == "/metrics",
            "exact lookup for {path:?}"
        );
        assert_eq!(with_wildcards.is_excluded(path), path == "/metrics");
    }
}

#[test]
fn wildcards_are_evaluated_in_declaration_order() {
    let set = ExclusionSet::new(["/api/*/public", "/api/**"]).unwrap();
    let first = set.matching_wildcard("/api/v1/public").unwrap();
    assert_eq!(first.as_str(), "/api/*/public");
    let second = set.matching_wildcard("/api/v1/private").unwrap();
    assert_eq!(second.as_str(), "/api/**");
    assert_eq!(set.wildcards().len(), 2);
}

#[test]
fn invalid_entry_fails_the_whole_set() {
    let err = ExclusionSet::new(["/health", "/**"]).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidPattern { .. }));
}

#[test]
fn parse_comma_separated_list() {
    let set = ExclusionSet::parse_list("/health, /static/**,,  /api/*/status ").unwrap();
    assert_eq!(set.len(), 3);
    assert!(set.is_excluded("/static/css/site.css"));
    assert!(set.is_excluded("/api/v9/status"));
}

#[test]
fn empty_set_excludes_nothing() {
    let set = ExclusionSet::empty();
    assert!(set.is_empty());
    assert!(!set.is_excluded("/health"));
    assert!(!set.is_excluded(""));
}

#[test]
fn long_adversarial_path_is_not_excluded() {
    let set = ExclusionSet::new(["/api/*/health", "/static/**"]).unwrap();
    let path = format!("/api/{}", "a/".repeat(10_000));
    assert!(!set.is_excluded(&path));
}
