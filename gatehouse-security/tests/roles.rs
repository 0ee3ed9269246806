mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gatehouse_security::claims::{ClaimPath, VerifiedClaims};
use gatehouse_security::keys::VerificationKey;
use gatehouse_security::parser::{Parser, ParserBuilder};
use gatehouse_security::roles::{
    ClaimRoleExtractor, Composite, Merge, RoleCache, RoleExtractor, RoleSet, RolesResolver,
};
use serde_json::json;

use common::*;

fn parser() -> Parser {
    ParserBuilder::new()
        .static_key(VerificationKey::from_secret(TEST_SECRET).unwrap())
        .allowed_algorithms(["HS256"])
        .build()
        .unwrap()
}

fn verified(claims: serde_json::Value) -> VerifiedClaims {
    parser().verify(&hs256_token(&claims)).unwrap()
}

fn cache() -> RoleCache {
    RoleCache::new(1000, Duration::from_secs(300))
}

/// Extractor that counts how often it runs.
#[derive(Clone, Default)]
struct CountingExtractor {
    inner: ClaimRoleExtractor,
    calls: Arc<AtomicUsize>,
}

impl CountingExtractor {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoleExtractor for CountingExtractor {
    fn extract_roles(&self, claims: &VerifiedClaims) -> RoleSet {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.extract_roles(claims)
    }
}

// ── Cold and warm paths ──

#[test]
fn warm_check_does_not_re_extract() {
    let extractor = CountingExtractor::default();
    let resolver = RolesResolver::new(extractor.clone(), cache());
    let claims = verified(claims_for("user-1", &["admin", "user"]));

    assert!(resolver.has_role(&claims, "admin"));
    assert_eq!(extractor.calls(), 1);
    assert!(resolver.has_role(&claims, "admin"));
    assert!(!resolver.has_role(&claims, "superuser"));
    assert!(resolver.has_any_role(&claims, &["superuser", "user"]));
    assert_eq!(extractor.calls(), 1);
    assert_eq!(resolver.cache().len(), 1);
}

#[test]
fn same_token_verified_twice_shares_the_cache_entry() {
    let extractor = CountingExtractor::default();
    let resolver = RolesResolver::new(extractor.clone(), cache());
    let token = hs256_token(&claims_for("user-1", &["admin"]));

    let first = parser().verify(&token).unwrap();
    let second = parser().verify(&token).unwrap();
    assert_eq!(first.token_id(), second.token_id());

    assert!(resolver.has_role(&first, "admin"));
    assert!(resolver.has_role(&second, "admin"));
    assert_eq!(extractor.calls(), 1);
}

#[test]
fn distinct_tokens_do_not_share_roles() {
    let resolver = RolesResolver::new(ClaimRoleExtractor::default(), cache());
    let admin = verified(claims_for("alice", &["admin"]));
    let mut claims = claims_for("alice", &["user"]);
    claims["iat"] = json!(now() - 1);
    let user = verified(claims);

    assert!(resolver.has_role(&admin, "admin"));
    assert!(!resolver.has_role(&user, "admin"));
    assert!(resolver.has_role(&user, "user"));
}

#[test]
fn cold_and_warm_results_are_identical() {
    let resolver = RolesResolver::new(ClaimRoleExtractor::default(), cache());
    let claims = verified(claims_for("user-1", &["admin", "user"]));
    let cold = resolver.roles(&claims);
    let warm = resolver.roles(&claims);
    assert_eq!(cold, warm);
    assert!(Arc::ptr_eq(&cold, &warm));
}

#[test]
fn zero_capacity_cache_forces_cold_path() {
    let extractor = CountingExtractor::default();
    let resolver = RolesResolver::new(extractor.clone(), RoleCache::disabled());
    let claims = verified(claims_for("user-1", &["admin"]));

    for _ in 0..3 {
        assert!(resolver.has_role(&claims, "admin"));
    }
    assert_eq!(extractor.calls(), 3);
    assert!(resolver.cache().is_empty());
}

#[test]
fn cache_entry_does_not_outlive_token() {
    let extractor = CountingExtractor::default();
    let resolver = RolesResolver::new(extractor.clone(), cache());
    let mut claims = claims_for("user-1", &["admin"]);
    claims["exp"] = json!(now() + 1);
    let claims = verified(claims);

    assert!(resolver.has_role(&claims, "admin"));
    std::thread::sleep(Duration::from_millis(2100));
    assert!(resolver.has_role(&claims, "admin"));
    assert_eq!(extractor.calls(), 2);
}

#[test]
fn token_without_expiry_uses_cache_ceiling() {
    let resolver = RolesResolver::new(
        ClaimRoleExtractor::default(),
        RoleCache::new(10, Duration::from_millis(50)),
    );
    let claims = verified(json!({"sub": "svc", "roles": ["batch"]}));
    assert!(resolver.has_role(&claims, "batch"));
    assert!(resolver.cache().contains_key(&claims.token_id()));
    std::thread::sleep(Duration::from_millis(80));
    assert!(!resolver.cache().contains_key(&claims.token_id()));
}

#[test]
fn cache_stays_bounded_under_many_tokens() {
    let resolver = RolesResolver::new(
        ClaimRoleExtractor::default(),
        RoleCache::new(16, Duration::from_secs(300)),
    );
    for i in 0..200 {
        let claims = verified(claims_for(&format!("user-{i}"), &["user"]));
        assert!(resolver.has_role(&claims, "user"));
        assert!(resolver.cache().len() <= 16);
    }
}

// ── Extraction ──

#[test]
fn nested_roles_claim() {
    let resolver = RolesResolver::new(ClaimRoleExtractor::new("realm_access.roles"), cache());
    let claims = verified(json!({
        "sub": "user-1",
        "realm_access": {"roles": ["admin", "manager"]},
        "exp": now() + 3600,
    }));
    assert!(resolver.has_role(&claims, "manager"));
    assert!(!resolver.has_role(&claims, "user"));
}

#[test]
fn delimited_string_roles_claim() {
    let resolver = RolesResolver::new(ClaimRoleExtractor::default(), cache());
    let claims = verified(json!({"sub": "user-1", "roles": "admin, user", "exp": now() + 3600}));
    let roles = resolver.roles(&claims);
    assert_eq!(roles.len(), 2);
    assert!(roles.contains("user"));
}

#[test]
fn missing_roles_claim_yields_no_roles() {
    let resolver = RolesResolver::new(ClaimRoleExtractor::new("groups"), cache());
    let claims = verified(claims_for("user-1", &["admin"]));
    assert!(resolver.roles(&claims).is_empty());
    assert!(!resolver.has_role(&claims, "admin"));
}

#[test]
fn empty_claim_path_yields_no_roles() {
    let extractor = ClaimRoleExtractor::new(ClaimPath::parse(""));
    let claims = verified(claims_for("user-1", &["admin"]));
    assert!(extractor.extract_roles(&claims).is_empty());
}

#[test]
fn composite_falls_back_to_second_extractor() {
    let extractor = Composite(
        ClaimRoleExtractor::new("roles"),
        ClaimRoleExtractor::new("realm_access.roles"),
    );
    let claims = verified(json!({"sub": "u", "realm_access": {"roles": ["admin"]}}));
    assert!(extractor.extract_roles(&claims).contains("admin"));

    let both = verified(json!({"sub": "u", "roles": ["user"], "realm_access": {"roles": ["admin"]}}));
    let roles = extractor.extract_roles(&both);
    assert!(roles.contains("user"));
    assert!(!roles.contains("admin"));
}

#[test]
fn merge_unions_both_extractors() {
    let extractor = Merge(
        ClaimRoleExtractor::new("roles"),
        ClaimRoleExtractor::new("realm_access.roles"),
    );
    let claims = verified(json!({"sub": "u", "roles": ["user", "admin"], "realm_access": {"roles": ["admin"]}}));
    let roles = extractor.extract_roles(&claims);
    assert_eq!(roles.len(), 2);
}
