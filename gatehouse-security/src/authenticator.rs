use std::time::Duration;

use gatehouse_cache::BoundedCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::claims::{ClaimPath, VerifiedClaims};
use crate::config::{KeySourceConfig, SecurityConfig, MAX_ROLE_CACHE_TTL};
use crate::decoder::TokenDecoder;
use crate::discovery::DiscoveryDocument;
use crate::error::{ConfigurationError, VerificationError};
use crate::exclusion::ExclusionSet;
use crate::jwks::JwksKeySet;
use crate::keys::VerificationKey;
use crate::parser::{Parser, ParserBuilder};
use crate::roles::{ClaimRoleExtractor, RoleCache, RoleExtractor, RolesResolver};
use crate::source::HeaderSource;

/// Distinct excluded paths remembered for warning throttling.
const EXCLUSION_WARNING_CAPACITY: usize = 10;
/// How long an excluded path stays quiet after its warning.
const EXCLUSION_WARNING_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// A caller whose token verified.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    claims: VerifiedClaims,
    username: String,
}

impl AuthenticatedCaller {
    pub fn claims(&self) -> &VerifiedClaims {
        &self.claims
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn into_claims(self) -> VerifiedClaims {
        self.claims
    }
}

/// Outcome of authenticating one request.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    /// The path is exempt; no authentication was attempted.
    Excluded,
    Authenticated(AuthenticatedCaller),
    Rejected(VerificationError),
}

impl AuthDecision {
    pub fn is_excluded(&self) -> bool {
        matches!(self, AuthDecision::Excluded)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthDecision::Authenticated(_))
    }

    pub fn caller(&self) -> Option<&AuthenticatedCaller> {
        match self {
            AuthDecision::Authenticated(caller) => Some(caller),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<VerificationError> {
        match self {
            AuthDecision::Rejected(err) => Some(*err),
            _ => None,
        }
    }
}

/// Cancels the background JWKS refresh when the authenticator is dropped.
struct RefreshHandle {
    cancel: CancellationToken,
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Per-request authentication: path exclusion, then token verification, then
/// role checks against the verified claims.
///
/// Everything here is read-only after construction except the role cache and
/// the exclusion-warning throttle, both internally synchronized. Share it
/// behind an `Arc`.
pub struct Authenticator<E = ClaimRoleExtractor> {
    exclusions: ExclusionSet,
    parser: Parser,
    roles: RolesResolver<E>,
    username_claims: Vec<String>,
    sources: Vec<HeaderSource>,
    exclusion_warnings: BoundedCache<String, ()>,
    refresh: Option<RefreshHandle>,
}

impl<E: RoleExtractor> Authenticator<E> {
    pub fn new(exclusions: ExclusionSet, parser: Parser, roles: RolesResolver<E>) -> Self {
        Self {
            exclusions,
            parser,
            roles,
            username_claims: Vec::new(),
            sources: vec![HeaderSource::authorization_bearer()],
            exclusion_warnings: BoundedCache::new(
                EXCLUSION_WARNING_CAPACITY,
                EXCLUSION_WARNING_INTERVAL,
            ),
            refresh: None,
        }
    }

    /// Claims tried in order for the username before falling back to `sub`.
    pub fn with_username_claims(mut self, claims: Vec<String>) -> Self {
        self.username_claims = claims;
        self
    }

    /// Headers consulted by [`Authenticator::authenticate_candidates`], in order.
    pub fn with_header_sources(mut self, sources: Vec<HeaderSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn roles(&self) -> &RolesResolver<E> {
        &self.roles
    }

    pub fn header_sources(&self) -> &[HeaderSource] {
        &self.sources
    }

    /// Authenticate a request given its path and raw bearer token, if any.
    pub fn authenticate(&self, path: &str, bearer: Option<&str>) -> AuthDecision {
        if self.exclusions.is_excluded(path) {
            self.note_excluded(path);
            return AuthDecision::Excluded;
        }
        match bearer.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => self.verify_token(path, token),
            None => {
                debug!(path, "No bearer token provided");
                AuthDecision::Rejected(VerificationError::MissingToken)
            }
        }
    }

    /// Authenticate from raw `(header name, header value)` pairs.
    ///
    /// Every configured [`HeaderSource`] that reads a given header is tried.
    /// The first token that verifies wins; otherwise the first rejection is
    /// returned, or `MissingToken` when no header held a token.
    pub fn authenticate_candidates<'a, I>(&self, path: &str, headers: I) -> AuthDecision
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if self.exclusions.is_excluded(path) {
            self.note_excluded(path);
            return AuthDecision::Excluded;
        }

        let mut first_rejection = None;
        for (name, value) in headers {
            for source in self.sources.iter().filter(|s| s.reads(name)) {
                let Some(token) = source.raw_token(value) else {
                    continue;
                };
                match self.verify_token(path, token) {
                    AuthDecision::Rejected(err) => {
                        first_rejection.get_or_insert(err);
                    }
                    decision => return decision,
                }
            }
        }

        let err = first_rejection.unwrap_or_else(|| {
            debug!(path, "No bearer token in any configured header");
            VerificationError::MissingToken
        });
        AuthDecision::Rejected(err)
    }

    /// Whether the authenticated caller holds `role`.
    ///
    /// Excluded requests have no caller and hold no roles. A rejected request
    /// propagates its rejection.
    pub fn has_role(&self, decision: &AuthDecision, role: &str) -> Result<bool, VerificationError> {
        match decision {
            AuthDecision::Excluded => Ok(false),
            AuthDecision::Authenticated(caller) => Ok(self.roles.has_role(&caller.claims, role)),
            AuthDecision::Rejected(err) => Err(*err),
        }
    }

    pub fn has_any_role(
        &self,
        decision: &AuthDecision,
        roles: &[&str],
    ) -> Result<bool, VerificationError> {
        match decision {
            AuthDecision::Excluded => Ok(false),
            AuthDecision::Authenticated(caller) => {
                Ok(self.roles.has_any_role(&caller.claims, roles))
            }
            AuthDecision::Rejected(err) => Err(*err),
        }
    }

    fn verify_token(&self, path: &str, token: &str) -> AuthDecision {
        let claims = match self.parser.verify(token) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(path, reason = %err, "Authentication rejected");
                return AuthDecision::Rejected(err);
            }
        };
        let Some(username) = claims.username(&self.username_claims).map(String::from) else {
            debug!(path, claims = ?self.username_claims, "Token has no username claim");
            return AuthDecision::Rejected(VerificationError::MissingUsername);
        };
        debug!(path, %username, "Authenticated");
        AuthDecision::Authenticated(AuthenticatedCaller { claims, username })
    }

    fn note_excluded(&self, path: &str) {
        if self.exclusion_warnings.contains_key(&path.to_string()) {
            return;
        }
        self.exclusion_warnings.insert(path.to_string(), ());
        warn!(path, "Path excluded from authentication");
    }
}

impl Authenticator<ClaimRoleExtractor> {
    /// Build an authenticator from configuration.
    ///
    /// For a `jwks` or `oidc_discovery` key source the key set is fetched
    /// here, and a background refresh task is started that stops when the
    /// authenticator is dropped.
    pub async fn from_config(config: &SecurityConfig) -> Result<Self, ConfigurationError> {
        let exclusions = ExclusionSet::new(&config.path_exclusions)?;
        if config.role_cache_ttl() > MAX_ROLE_CACHE_TTL {
            return Err(ConfigurationError::InvalidValue {
                key: "role_cache_ttl_secs",
                reason: format!(
                    "{}s exceeds the maximum of {}s",
                    config.role_cache_ttl_secs,
                    MAX_ROLE_CACHE_TTL.as_secs()
                ),
            });
        }
        let decoder = TokenDecoder::shared();

        let mut builder = ParserBuilder::new()
            .allowed_algorithms(&config.allowed_algorithms)
            .clock_skew(config.clock_skew())
            .max_token_bytes(config.max_token_bytes)
            .shared_decoder(decoder.clone());
        if let Some(audience) = &config.audience {
            builder = builder.audience(audience.clone());
        }
        let mut issuer = config.issuer.clone();

        let mut refresh = None;
        builder = match &config.key {
            KeySourceConfig::Secret { value } => {
                builder.static_key(VerificationKey::from_secret_str(value)?)
            }
            KeySourceConfig::PublicKey { pem, algorithm } => {
                let alg = decoder
                    .algorithm(algorithm.trim())
                    .ok_or_else(|| ConfigurationError::UnknownAlgorithm(algorithm.clone()))?;
                builder.static_key(VerificationKey::from_pem(pem, alg)?)
            }
            KeySourceConfig::Jwks {
                url,
                refresh_interval_secs,
                min_refresh_interval_secs,
            } => {
                let (keys, handle) = load_jwks(
                    url,
                    reqwest::Client::new(),
                    *refresh_interval_secs,
                    *min_refresh_interval_secs,
                )
                .await?;
                refresh = handle;
                builder.jwks(keys)
            }
            KeySourceConfig::OidcDiscovery {
                url,
                refresh_interval_secs,
                min_refresh_interval_secs,
            } => {
                let client = reqwest::Client::new();
                let document = DiscoveryDocument::fetch(&client, url).await?;
                let jwks_uri = document.jwks_uri().ok_or_else(|| {
                    ConfigurationError::KeyFetch(format!("OpenID Connect configuration at {url} has no jwks_uri"))
                })?;
                if issuer.is_none() {
                    issuer = document.issuer.clone();
                }
                let (keys, handle) = load_jwks(
                    jwks_uri,
                    client,
                    *refresh_interval_secs,
                    *min_refresh_interval_secs,
                )
                .await?;
                refresh = handle;
                builder.jwks(keys)
            }
            KeySourceConfig::JwksInline { json } => builder.jwks(JwksKeySet::from_json(json)?),
        };
        if let Some(issuer) = issuer {
            builder = builder.issuer(issuer);
        }
        let parser = builder.build()?;

        let roles = RolesResolver::new(
            ClaimRoleExtractor::new(ClaimPath::parse(&config.roles_claim)),
            RoleCache::new(config.role_cache_capacity, config.role_cache_ttl()),
        );

        info!(
            %parser,
            exclusions = exclusions.len(),
            roles_claim = %config.roles_claim,
            "Authenticator configured"
        );

        let mut authenticator = Self::new(exclusions, parser, roles)
            .with_username_claims(config.username_claims.clone());
        authenticator.refresh = refresh;
        Ok(authenticator)
    }
}

/// Fetch a JWKS key set and, for a non-zero interval, start its refresh task.
async fn load_jwks(
    url: &str,
    client: reqwest::Client,
    refresh_interval_secs: u64,
    min_refresh_interval_secs: u64,
) -> Result<(JwksKeySet, Option<RefreshHandle>), ConfigurationError> {
    let keys =
        JwksKeySet::fetch_with(url, client, Duration::from_secs(min_refresh_interval_secs)).await?;
    if refresh_interval_secs == 0 {
        return Ok((keys, None));
    }
    let cancel = CancellationToken::new();
    keys.spawn_refresh(Duration::from_secs(refresh_interval_secs), cancel.clone());
    Ok((keys, Some(RefreshHandle { cancel })))
}

impl<E> std::fmt::Debug for Authenticator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("exclusions", &self.exclusions.len())
            .field("parser", &self.parser)
            .field("username_claims", &self.username_claims)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}
