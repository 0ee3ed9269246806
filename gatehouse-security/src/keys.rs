use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey};

use crate::error::ConfigurationError;

/// Minimum HMAC secret length in bytes (256 bits).
pub const MIN_SECRET_BYTES: usize = 32;

/// A key ready for signature verification.
///
/// `algorithm`, when set, pins the key: a token declaring any other algorithm
/// is refused before signature work.
#[derive(Clone)]
pub struct VerificationKey {
    key: Arc<DecodingKey>,
    algorithm: Option<Algorithm>,
}

impl VerificationKey {
    pub fn new(key: DecodingKey) -> Self {
        Self {
            key: Arc::new(key),
            algorithm: None,
        }
    }

    pub fn pinned(key: DecodingKey, algorithm: Algorithm) -> Self {
        Self {
            key: Arc::new(key),
            algorithm: Some(algorithm),
        }
    }

    /// An HMAC secret. Rejects secrets shorter than [`MIN_SECRET_BYTES`].
    pub fn from_secret(secret: &[u8]) -> Result<Self, ConfigurationError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigurationError::InvalidKey(format!(
                "secret must be at least {MIN_SECRET_BYTES} bytes, got {}",
                secret.len()
            )));
        }
        Ok(Self::new(DecodingKey::from_secret(secret)))
    }

    /// A configured secret string: base64 when it decodes, raw bytes otherwise.
    pub fn from_secret_str(secret: &str) -> Result<Self, ConfigurationError> {
        match STANDARD.decode(secret.trim()) {
            Ok(bytes) if bytes.len() >= MIN_SECRET_BYTES => Self::from_secret(&bytes),
            _ => Self::from_secret(secret.as_bytes()),
        }
    }

    /// A PEM-encoded public key, pinned to `algorithm`.
    pub fn from_pem(pem: &str, algorithm: Algorithm) -> Result<Self, ConfigurationError> {
        let pem = pem.as_bytes();
        let key = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(ConfigurationError::InvalidKey(format!(
                    "{algorithm:?} takes a secret, not a PEM key"
                )))
            }
        }
        .map_err(|e| ConfigurationError::InvalidKey(format!("Failed to parse PEM key: {e}")))?;
        Ok(Self::pinned(key, algorithm))
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Whether this key may verify a token declaring `algorithm`.
    pub fn permits(&self, algorithm: Algorithm) -> bool {
        self.algorithm.map_or(true, |pinned| pinned == algorithm)
    }
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Key resolution strategy: maps the header's key id to a verification key.
///
/// Implementations are consulted on every request and must not perform I/O.
pub trait KeyResolver: Send + Sync {
    /// The key for `kid`, or `None` when no key matches.
    fn resolve(&self, kid: Option<&str>) -> Option<VerificationKey>;

    /// Short description used in logs and in the parser's `Display`.
    fn describe(&self) -> String;

    /// Whether the resolver can never produce a key.
    fn is_empty(&self) -> bool {
        false
    }
}

/// A single key used regardless of the token's key id.
#[derive(Debug, Clone)]
pub struct StaticKey {
    key: VerificationKey,
}

impl StaticKey {
    pub fn new(key: VerificationKey) -> Self {
        Self { key }
    }
}

impl KeyResolver for StaticKey {
    fn resolve(&self, _kid: Option<&str>) -> Option<VerificationKey> {
        Some(self.key.clone())
    }

    fn describe(&self) -> String {
        match self.key.algorithm {
            Some(Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) | None => {
                "SecretKey".to_string()
            }
            Some(alg) => format!("PublicKey({alg:?})"),
        }
    }
}

/// A fixed set of keys indexed by key id.
///
/// Tokens without a `kid` resolve only when the set holds exactly one key.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    pub fn new<I, S>(keys: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (S, VerificationKey)>,
        S: Into<String>,
    {
        let keys: HashMap<String, VerificationKey> =
            keys.into_iter().map(|(kid, key)| (kid.into(), key)).collect();
        if keys.is_empty() {
            return Err(ConfigurationError::EmptyKeySet);
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids, sorted.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}

impl KeyResolver for KeySet {
    fn resolve(&self, kid: Option<&str>) -> Option<VerificationKey> {
        match kid {
            Some(kid) => self.keys.get(kid).cloned(),
            None if self.keys.len() == 1 => self.keys.values().next().cloned(),
            None => None,
        }
    }

    fn describe(&self) -> String {
        format!("Keyed(kids={})", self.kids().join(","))
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<R: KeyResolver + ?Sized> KeyResolver for Arc<R> {
    fn resolve(&self, kid: Option<&str>) -> Option<VerificationKey> {
        (**self).resolve(kid)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
}
