use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::de::IgnoredAny;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::claims::{TokenId, VerifiedClaims};
use crate::decoder::TokenDecoder;
use crate::error::{ConfigurationError, VerificationError};
use crate::jwks::JwksKeySet;
use crate::keys::{KeyResolver, KeySet, StaticKey, VerificationKey};

/// Largest accepted clock-skew tolerance.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Default upper bound on the raw token length, in bytes.
pub const DEFAULT_MAX_TOKEN_BYTES: usize = 8192;

/// Builds immutable [`Parser`] values.
///
/// The builder itself is reusable: `build` borrows it, so the same builder
/// can produce several parsers, optionally sharing one [`TokenDecoder`].
///
/// ```ignore
/// let parser = ParserBuilder::new()
///     .static_key(VerificationKey::from_secret(secret)?)
///     .allowed_algorithms(["HS256"])
///     .issuer("https://auth.example.com")
///     .clock_skew(Duration::from_secs(30))
///     .build()?;
/// let claims = parser.verify(token)?;
/// ```
#[derive(Clone)]
pub struct ParserBuilder {
    resolver: Option<Arc<dyn KeyResolver>>,
    algorithms: Vec<String>,
    clock_skew: Duration,
    issuer: Option<String>,
    audience: Option<String>,
    max_token_bytes: usize,
    decoder: Option<Arc<TokenDecoder>>,
}

impl Default for ParserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserBuilder {
    /// A builder allowing RS256 only, with no clock skew and no issuer or
    /// audience requirement. A key source must be set before building.
    pub fn new() -> Self {
        Self {
            resolver: None,
            algorithms: vec!["RS256".to_string()],
            clock_skew: Duration::ZERO,
            issuer: None,
            audience: None,
            max_token_bytes: DEFAULT_MAX_TOKEN_BYTES,
            decoder: None,
        }
    }

    /// Verify every token with one key.
    pub fn static_key(self, key: VerificationKey) -> Self {
        self.key_resolver(StaticKey::new(key))
    }

    /// Pick the key by the header's `kid`.
    pub fn key_set(self, keys: KeySet) -> Self {
        self.key_resolver(keys)
    }

    /// Pick the key from a JWKS key set kept fresh in the background.
    pub fn jwks(self, keys: JwksKeySet) -> Self {
        self.key_resolver(keys)
    }

    pub fn key_resolver(mut self, resolver: impl KeyResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Algorithm allow-list, by JOSE name. Replaces the previous list.
    pub fn allowed_algorithms<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.algorithms = names.into_iter().map(|n| n.as_ref().trim().to_string()).collect();
        self
    }

    /// Tolerance applied to `exp` and `nbf`. At most [`MAX_CLOCK_SKEW`].
    pub fn clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn max_token_bytes(mut self, max: usize) -> Self {
        self.max_token_bytes = max;
        self
    }

    /// Reuse an existing decoding component instead of allocating one per build.
    pub fn shared_decoder(mut self, decoder: Arc<TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Validate the configuration and produce a parser.
    pub fn build(&self) -> Result<Parser, ConfigurationError> {
        let resolver = match &self.resolver {
            Some(resolver) if !resolver.is_empty() => resolver.clone(),
            _ => return Err(ConfigurationError::EmptyKeySet),
        };
        if self.algorithms.is_empty() {
            return Err(ConfigurationError::NoAlgorithms);
        }
        if self.clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigurationError::InvalidValue {
                key: "clock_skew",
                reason: format!(
                    "{}s exceeds the maximum of {}s",
                    self.clock_skew.as_secs(),
                    MAX_CLOCK_SKEW.as_secs()
                ),
            });
        }
        if self.max_token_bytes == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "max_token_bytes",
                reason: "must be greater than zero".into(),
            });
        }

        let decoder = self
            .decoder
            .clone()
            .unwrap_or_else(|| Arc::new(TokenDecoder::new()));

        let mut allowed = Vec::with_capacity(self.algorithms.len());
        let mut validations = HashMap::with_capacity(self.algorithms.len());
        for name in &self.algorithms {
            let algorithm = decoder
                .algorithm(name)
                .ok_or_else(|| ConfigurationError::UnknownAlgorithm(name.clone()))?;
            if !allowed.contains(&algorithm) {
                allowed.push(algorithm);
            }
            validations.insert(algorithm, signature_only(algorithm));
        }

        Ok(Parser {
            config: Arc::new(ParserConfig {
                resolver,
                allowed,
                validations,
                clock_skew: self.clock_skew,
                issuer: self.issuer.clone(),
                audience: self.audience.clone(),
                max_token_bytes: self.max_token_bytes,
                decoder,
            }),
        })
    }
}

/// Signature-only validation; time and audience claims are checked by the parser.
fn signature_only(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.required_spec_claims.clear();
    validation
}

/// Immutable verification settings shared by all clones of a [`Parser`].
pub struct ParserConfig {
    resolver: Arc<dyn KeyResolver>,
    allowed: Vec<Algorithm>,
    validations: HashMap<Algorithm, Validation>,
    clock_skew: Duration,
    issuer: Option<String>,
    audience: Option<String>,
    max_token_bytes: usize,
    decoder: Arc<TokenDecoder>,
}

impl ParserConfig {
    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    pub fn max_token_bytes(&self) -> usize {
        self.max_token_bytes
    }

    pub fn decoder(&self) -> &Arc<TokenDecoder> {
        &self.decoder
    }
}

/// A built, thread-safe token verifier. Cloning is cheap.
#[derive(Clone)]
pub struct Parser {
    config: Arc<ParserConfig>,
}

impl Parser {
    pub fn builder() -> ParserBuilder {
        ParserBuilder::new()
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Verify a raw token against the current time.
    pub fn verify(&self, raw: &str) -> Result<VerifiedClaims, VerificationError> {
        self.verify_at(raw, Utc::now().timestamp())
    }

    /// Verify a raw token as of `now` (seconds since the Unix epoch).
    ///
    /// This performs, in order:
    /// 1. Size and structure checks
    /// 2. The algorithm allow-list check, before any key lookup
    /// 3. Key resolution by `kid`
    /// 4. Signature verification
    /// 5. `exp`, `nbf`, `iss` and `aud` checks
    pub fn verify_at(&self, raw: &str, now: i64) -> Result<VerifiedClaims, VerificationError> {
        let config = &*self.config;

        if raw.len() > config.max_token_bytes {
            debug!(
                len = raw.len(),
                max = config.max_token_bytes,
                "Token rejected: exceeds size limit"
            );
            return Err(VerificationError::Malformed);
        }

        // Step 1: Structural decode
        let decoded = config.decoder.decode(raw)?;

        // Step 2: Algorithm allow-list
        let Some(name) = decoded.header.alg.as_deref() else {
            debug!("Token rejected: header has no 'alg'");
            return Err(VerificationError::Malformed);
        };
        let algorithm = match config.decoder.algorithm(name) {
            Some(alg) if config.allowed.contains(&alg) => alg,
            _ => {
                debug!(alg = %name, "Token rejected: algorithm not allowed");
                return Err(VerificationError::UnsupportedAlgorithm);
            }
        };
        let kid = decoded.header.kid.as_deref();
        debug!(?algorithm, ?kid, "Decoded token header");

        // Step 3: Key resolution
        let key = match config.resolver.resolve(kid) {
            Some(key) if key.permits(algorithm) => key,
            Some(key) => {
                debug!(?algorithm, pinned = ?key.algorithm(), ?kid, "Token rejected: key pinned to another algorithm");
                return Err(VerificationError::KeyResolutionFailed);
            }
            None => {
                debug!(?kid, "Token rejected: no matching verification key");
                return Err(VerificationError::KeyResolutionFailed);
            }
        };

        // Step 4: Signature
        let validation = config
            .validations
            .get(&algorithm)
            .ok_or(VerificationError::UnsupportedAlgorithm)?;
        decode::<IgnoredAny>(raw, key.decoding_key(), validation).map_err(|e| {
            let err = match e.kind() {
                ErrorKind::InvalidSignature => VerificationError::SignatureInvalid,
                ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::InvalidToken => VerificationError::Malformed,
                ErrorKind::InvalidAlgorithm => VerificationError::KeyResolutionFailed,
                _ => VerificationError::SignatureInvalid,
            };
            if err == VerificationError::SignatureInvalid {
                warn!(?algorithm, ?kid, error = %e, "Token signature verification failed");
            } else {
                debug!(?algorithm, ?kid, error = %e, rejection = %err, "Token rejected during signature check");
            }
            err
        })?;

        // Step 5: Claims
        let claims = decoded.claims;
        let skew = config.clock_skew.as_secs() as i64;
        let exp = numeric_claim(&claims, "exp")?;
        let nbf = numeric_claim(&claims, "nbf")?;

        if let Some(exp) = exp {
            if now.saturating_sub(skew) > exp {
                debug!(exp, now, "Token rejected: expired");
                return Err(VerificationError::Expired);
            }
        }
        if let Some(nbf) = nbf {
            if now.saturating_add(skew) < nbf {
                debug!(nbf, now, "Token rejected: not yet valid");
                return Err(VerificationError::NotYetValid);
            }
        }

        let issuer = claims.get("iss").and_then(Value::as_str).map(String::from);
        if let Some(required) = &config.issuer {
            if issuer.as_deref() != Some(required.as_str()) {
                warn!(expected = %required, actual = ?issuer, "Token rejected: issuer mismatch");
                return Err(VerificationError::IssuerMismatch);
            }
        }

        let audience = audience_claim(&claims);
        if let Some(required) = &config.audience {
            if !audience.iter().any(|aud| aud == required) {
                warn!(expected = %required, actual = ?audience, "Token rejected: audience mismatch");
                return Err(VerificationError::AudienceMismatch);
            }
        }

        let issued_at = numeric_claim(&claims, "iat").ok().flatten();
        Ok(VerifiedClaims {
            token_id: TokenId::of_verified(raw),
            subject: claims.get("sub").and_then(Value::as_str).map(String::from),
            issuer,
            audience,
            expires_at: exp.and_then(timestamp),
            not_before: nbf.and_then(timestamp),
            issued_at: issued_at.and_then(timestamp),
            claims,
        })
    }
}

impl std::fmt::Display for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = &*self.config;
        write!(
            f,
            "Parser{{verificationMethod={}, algorithms={:?}, clockSkew={}s",
            config.resolver.describe(),
            config.allowed,
            config.clock_skew.as_secs()
        )?;
        if let Some(issuer) = &config.issuer {
            write!(f, ", issuer={issuer}")?;
        }
        if let Some(audience) = &config.audience {
            write!(f, ", audience={audience}")?;
        }
        write!(f, "}}")
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// An optional NumericDate claim. Present but non-numeric is malformed.
fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Result<Option<i64>, VerificationError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or(VerificationError::Malformed),
        Some(_) => {
            debug!(claim = name, "Token rejected: non-numeric date claim");
            Err(VerificationError::Malformed)
        }
    }
}

/// `aud` may be a single string or an array of strings.
fn audience_claim(claims: &Map<String, Value>) -> Vec<String> {
    match claims.get("aud") {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}
