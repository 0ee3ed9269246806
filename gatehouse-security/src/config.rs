use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigurationError;

/// Largest accepted role-cache TTL ceiling.
pub const MAX_ROLE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Where verification keys come from.
///
/// In YAML, the variant is selected by `type`:
///
/// ```yaml
/// key:
///   type: jwks
///   url: https://auth.example.com/.well-known/jwks.json
///   refresh_interval_secs: 3600
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeySourceConfig {
    /// HMAC secret, base64-encoded or raw.
    Secret { value: String },

    /// PEM public key (RSA, EC or Ed25519) for the named algorithm.
    PublicKey { pem: String, algorithm: String },

    /// Remote JWKS document (`http(s)://` or `file://`), refreshed in the background.
    Jwks {
        url: String,
        /// Periodic refresh interval in seconds (default: 3600). Zero disables it.
        #[serde(default = "default_jwks_refresh_secs")]
        refresh_interval_secs: u64,
        /// Minimum interval between refresh attempts in seconds (default: 10)
        #[serde(default = "default_jwks_min_refresh_secs")]
        min_refresh_interval_secs: u64,
    },

    /// OpenID Connect discovery document, usually
    /// `<issuer>/.well-known/openid-configuration`. Its `jwks_uri` is loaded
    /// like a `jwks` source, and its `issuer` becomes the required issuer
    /// unless one is configured.
    OidcDiscovery {
        url: String,
        #[serde(default = "default_jwks_refresh_secs")]
        refresh_interval_secs: u64,
        #[serde(default = "default_jwks_min_refresh_secs")]
        min_refresh_interval_secs: u64,
    },

    /// JWKS document given inline.
    JwksInline { json: String },
}

impl KeySourceConfig {
    pub fn secret(value: impl Into<String>) -> Self {
        Self::Secret {
            value: value.into(),
        }
    }

    pub fn jwks(url: impl Into<String>) -> Self {
        Self::Jwks {
            url: url.into(),
            refresh_interval_secs: default_jwks_refresh_secs(),
            min_refresh_interval_secs: default_jwks_min_refresh_secs(),
        }
    }

    pub fn oidc_discovery(url: impl Into<String>) -> Self {
        Self::OidcDiscovery {
            url: url.into(),
            refresh_interval_secs: default_jwks_refresh_secs(),
            min_refresh_interval_secs: default_jwks_min_refresh_secs(),
        }
    }
}

/// Authentication configuration, read once at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct SecurityConfig {
    /// Paths exempt from authentication (`/health`, `/api/*/status`, `/static/**`)
    #[serde(default)]
    pub path_exclusions: Vec<String>,

    pub key: KeySourceConfig,

    /// Allowed JWT algorithms. Tokens using other algorithms are rejected.
    /// Default: RS256 only.
    #[serde(default = "default_algorithms")]
    pub allowed_algorithms: Vec<String>,

    /// Tolerance for `exp`/`nbf` in seconds (default: 0, max: 600)
    #[serde(default)]
    pub clock_skew_secs: u64,

    /// Required `iss` claim
    #[serde(default)]
    pub issuer: Option<String>,

    /// Required `aud` claim
    #[serde(default)]
    pub audience: Option<String>,

    /// Dotted path of the roles claim (default: `roles`)
    #[serde(default = "default_roles_claim")]
    pub roles_claim: String,

    /// Claims tried in order for the username, before `sub`
    #[serde(default)]
    pub username_claims: Vec<String>,

    /// Maximum cached role sets (default: 10000). Zero disables caching.
    #[serde(default = "default_role_cache_capacity")]
    pub role_cache_capacity: usize,

    /// Upper bound on a cached role set's lifetime in seconds (default: 300, max: 86400)
    #[serde(default = "default_role_cache_ttl_secs")]
    pub role_cache_ttl_secs: u64,

    /// Tokens longer than this are rejected unread (default: 8192)
    #[serde(default = "default_max_token_bytes")]
    pub max_token_bytes: usize,
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_string()]
}

fn default_roles_claim() -> String {
    "roles".to_string()
}

fn default_role_cache_capacity() -> usize {
    10_000
}

fn default_role_cache_ttl_secs() -> u64 {
    300
}

fn default_max_token_bytes() -> usize {
    8192
}

fn default_jwks_refresh_secs() -> u64 {
    3600
}

fn default_jwks_min_refresh_secs() -> u64 {
    10
}

impl SecurityConfig {
    /// Create a configuration for the given key source with all other settings at their defaults.
    pub fn new(key: KeySourceConfig) -> Self {
        Self {
            path_exclusions: Vec::new(),
            key,
            allowed_algorithms: default_algorithms(),
            clock_skew_secs: 0,
            issuer: None,
            audience: None,
            roles_claim: default_roles_claim(),
            username_claims: Vec::new(),
            role_cache_capacity: default_role_cache_capacity(),
            role_cache_ttl_secs: default_role_cache_ttl_secs(),
            max_token_bytes: default_max_token_bytes(),
        }
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::Load(e.to_string()))
    }

    pub fn with_path_exclusions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_exclusions = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the allowed JWT algorithms. Empty lists will cause the build to fail.
    pub fn with_allowed_algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_algorithms = algorithms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_clock_skew(mut self, skew_secs: u64) -> Self {
        self.clock_skew_secs = skew_secs;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_roles_claim(mut self, path: impl Into<String>) -> Self {
        self.roles_claim = path.into();
        self
    }

    pub fn with_username_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.username_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_role_cache(mut self, capacity: usize, ttl_secs: u64) -> Self {
        self.role_cache_capacity = capacity;
        self.role_cache_ttl_secs = ttl_secs;
        self
    }

    pub fn with_max_token_bytes(mut self, max: usize) -> Self {
        self.max_token_bytes = max;
        self
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    pub fn role_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.role_cache_ttl_secs)
    }
}
