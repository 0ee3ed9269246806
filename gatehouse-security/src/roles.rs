//! Role extraction and cached role-membership checks.
//!
//! A [`RoleExtractor`] turns verified claims into a normalized [`RoleSet`].
//! [`RolesResolver`] runs the extractor once per token (the cold path) and
//! serves later checks for the same token from a [`RoleCache`] (the warm path).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gatehouse_cache::BoundedCache;
use serde_json::Value;
use tracing::debug;

use crate::claims::{ClaimPath, TokenId, VerifiedClaims};

/// Normalized role names.
pub type RoleSet = HashSet<String>;

/// Resolved roles keyed by verified token identity.
pub type RoleCache = BoundedCache<TokenId, Arc<RoleSet>>;

/// Trait for extracting roles from verified claims.
///
/// Different identity providers store roles in different claim locations.
/// Implement this trait to customize role extraction for your provider.
///
/// # Example
///
/// ```ignore
/// use gatehouse_security::roles::{RoleExtractor, RoleSet};
///
/// struct GroupsExtractor;
///
/// impl RoleExtractor for GroupsExtractor {
///     fn extract_roles(&self, claims: &VerifiedClaims) -> RoleSet {
///         claims
///             .get("groups")
///             .and_then(|v| v.as_array())
///             .map(|arr| arr.iter().filter_map(|r| r.as_str().map(String::from)).collect())
///             .unwrap_or_default()
///     }
/// }
/// ```
pub trait RoleExtractor: Send + Sync {
    fn extract_roles(&self, claims: &VerifiedClaims) -> RoleSet;
}

impl<E: RoleExtractor + ?Sized> RoleExtractor for Arc<E> {
    fn extract_roles(&self, claims: &VerifiedClaims) -> RoleSet {
        (**self).extract_roles(claims)
    }
}

/// Reads roles from one (possibly nested) claim and normalizes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRoleExtractor {
    path: ClaimPath,
}

impl ClaimRoleExtractor {
    pub fn new(path: impl Into<ClaimPath>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &ClaimPath {
        &self.path
    }
}

impl Default for ClaimRoleExtractor {
    /// The top-level `roles` claim.
    fn default() -> Self {
        Self::new(ClaimPath::top_level("roles"))
    }
}

impl RoleExtractor for ClaimRoleExtractor {
    fn extract_roles(&self, claims: &VerifiedClaims) -> RoleSet {
        claims.find(&self.path).map(normalize_roles).unwrap_or_default()
    }
}

/// Normalize a roles claim value.
///
/// - a string containing `,` is split; each part is trimmed, blanks dropped
/// - any other string is one trimmed role, none if blank
/// - array elements are trimmed strings; numbers and booleans are stringified,
///   `null` and nested values are ignored, blanks dropped
/// - anything else yields no roles
pub fn normalize_roles(value: &Value) -> RoleSet {
    match value {
        Value::String(s) if s.contains(',') => s
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect(),
        Value::String(s) => scalar_role(s).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => scalar_role(s),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        _ => RoleSet::new(),
    }
}

fn scalar_role(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Tries two extractors in order and returns the first non-empty result.
///
/// For more than two extractors, nest multiple `Composite` instances.
///
/// ```ignore
/// let extractor = Composite(
///     ClaimRoleExtractor::new("roles"),
///     ClaimRoleExtractor::new("realm_access.roles"),
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Composite<A, B>(pub A, pub B);

impl<A: RoleExtractor, B: RoleExtractor> RoleExtractor for Composite<A, B> {
    fn extract_roles(&self, claims: &VerifiedClaims) -> RoleSet {
        let roles = self.0.extract_roles(claims);
        if !roles.is_empty() {
            roles
        } else {
            self.1.extract_roles(claims)
        }
    }
}

/// Union of the roles from two extractors.
#[derive(Debug, Clone, Copy)]
pub struct Merge<A, B>(pub A, pub B);

impl<A: RoleExtractor, B: RoleExtractor> RoleExtractor for Merge<A, B> {
    fn extract_roles(&self, claims: &VerifiedClaims) -> RoleSet {
        let mut roles = self.0.extract_roles(claims);
        roles.extend(self.1.extract_roles(claims));
        roles
    }
}

/// Answers role-membership questions for verified callers.
///
/// The cache is injected so tests can pass a zero-capacity cache to force
/// the cold path on every call.
#[derive(Clone)]
pub struct RolesResolver<E = ClaimRoleExtractor> {
    extractor: E,
    cache: RoleCache,
}

impl<E: RoleExtractor> RolesResolver<E> {
    pub fn new(extractor: E, cache: RoleCache) -> Self {
        Self { extractor, cache }
    }

    pub fn cache(&self) -> &RoleCache {
        &self.cache
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// The caller's roles, from the cache when this token was seen before.
    pub fn roles(&self, claims: &VerifiedClaims) -> Arc<RoleSet> {
        let id = claims.token_id();
        if let Some(roles) = self.cache.get(&id) {
            return roles;
        }

        let roles = Arc::new(self.extractor.extract_roles(claims));
        match entry_ttl(claims, self.cache.ttl()) {
            Some(ttl) => self.cache.insert_with_ttl(id, roles.clone(), ttl),
            None => debug!(token = ?id, "Token at or past expiry, roles not cached"),
        }
        debug!(token = ?id, roles = roles.len(), "Resolved roles from claims");
        roles
    }

    pub fn has_role(&self, claims: &VerifiedClaims, role: &str) -> bool {
        self.roles(claims).contains(role)
    }

    pub fn has_any_role(&self, claims: &VerifiedClaims, roles: &[&str]) -> bool {
        let held = self.roles(claims);
        roles.iter().any(|role| held.contains(*role))
    }
}

/// Cache lifetime for a token's roles: the ceiling, shortened to the token's
/// remaining validity. `None` when the token has no time left.
fn entry_ttl(claims: &VerifiedClaims, ceiling: Duration) -> Option<Duration> {
    match claims.expires_at() {
        None => Some(ceiling),
        Some(exp) => {
            let remaining = exp.timestamp() - Utc::now().timestamp();
            (remaining > 0).then(|| Duration::from_secs(remaining as u64).min(ceiling))
        }
    }
}
