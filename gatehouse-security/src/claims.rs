use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Identity of a verified token: the SHA-256 digest of its raw text.
///
/// Only the verifier can produce one, and only after the signature checked
/// out, so a caller cannot steer a cache lookup onto another principal's
/// entry without also forging that principal's token.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId([u8; 32]);

impl TokenId {
    pub(crate) fn of_verified(raw: &str) -> Self {
        Self(Sha256::digest(raw.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short prefix only, enough to correlate log lines.
        write!(f, "TokenId(")?;
        for byte in &self.0[..6] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Claims of a token whose signature and standard claims have been checked.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub(crate) token_id: TokenId,
    pub(crate) subject: Option<String>,
    pub(crate) issuer: Option<String>,
    pub(crate) audience: Vec<String>,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) not_before: Option<DateTime<Utc>>,
    pub(crate) issued_at: Option<DateTime<Utc>>,
    pub(crate) claims: Map<String, Value>,
}

impl VerifiedClaims {
    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// The `iss` claim.
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// The `aud` claim, normalized to a list.
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// All claims, in token order.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// A single top-level claim.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Look up a possibly nested claim.
    pub fn find(&self, path: &ClaimPath) -> Option<&Value> {
        path.find(&self.claims)
    }

    /// Resolve the caller's username.
    ///
    /// `claims` are tried in order; blank and non-string values are skipped.
    /// Falls back to `sub`.
    pub fn username(&self, claims: &[String]) -> Option<&str> {
        claims
            .iter()
            .filter_map(|name| self.claims.get(name).and_then(Value::as_str))
            .find(|value| !value.trim().is_empty())
            .or_else(|| self.subject().filter(|sub| !sub.trim().is_empty()))
    }
}

/// A dotted path into the claim set, such as `realm_access.roles`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimPath {
    segments: Vec<String>,
}

impl ClaimPath {
    /// Parse a dotted path. Blank segments are dropped, so a blank string
    /// yields an empty path that never resolves.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// A path naming one top-level claim, taken literally (dots included).
    pub fn top_level(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    pub fn of<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk nested objects. Any non-object on the way means the claim is absent.
    pub fn find<'a>(&self, claims: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = claims.get(first)?;
        for key in rest {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }
}

impl std::fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<&str> for ClaimPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}
