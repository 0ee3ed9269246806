use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ConfigurationError;
use crate::keys::{KeyResolver, VerificationKey, MIN_SECRET_BYTES};

/// Default minimum interval between two refresh attempts.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Raw JWK structure as found in a JWKS document.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    /// Key ID
    kid: Option<String>,
    /// Key type ("RSA", "EC", "OKP", "oct")
    kty: String,
    /// Algorithm (e.g. "RS256"); pins the key when present
    #[serde(default)]
    alg: Option<String>,
    /// RSA modulus (base64url)
    #[serde(default)]
    n: Option<String>,
    /// RSA exponent (base64url)
    #[serde(default)]
    e: Option<String>,
    /// EC / OKP x coordinate (base64url)
    #[serde(default)]
    x: Option<String>,
    /// EC y coordinate (base64url)
    #[serde(default)]
    y: Option<String>,
    /// Symmetric key value (base64url)
    #[serde(default)]
    k: Option<String>,
}

/// JWKS document envelope.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

impl Jwk {
    fn to_verification_key(&self) -> Result<VerificationKey, String> {
        let kty = self.kty.as_str();
        let key = match kty {
            "RSA" => DecodingKey::from_rsa_components(
                component(kty, &self.n, "n")?,
                component(kty, &self.e, "e")?,
            ),
            "EC" => DecodingKey::from_ec_components(
                component(kty, &self.x, "x")?,
                component(kty, &self.y, "y")?,
            ),
            "OKP" => DecodingKey::from_ed_components(component(kty, &self.x, "x")?),
            "oct" => {
                let secret = URL_SAFE_NO_PAD
                    .decode(component(kty, &self.k, "k")?.trim_end_matches('='))
                    .map_err(|e| format!("invalid 'k' component: {e}"))?;
                if secret.len() < MIN_SECRET_BYTES {
                    return Err(format!("symmetric key shorter than {MIN_SECRET_BYTES} bytes"));
                }
                Ok(DecodingKey::from_secret(&secret))
            }
            other => return Err(format!("unsupported key type: {other}")),
        }
        .map_err(|e| format!("failed to construct {} decoding key: {e}", self.kty))?;

        match self.alg.as_deref() {
            Some(name) => {
                let alg = Algorithm::from_str(name).map_err(|_| format!("unknown algorithm: {name}"))?;
                Ok(VerificationKey::pinned(key, alg))
            }
            None => Ok(VerificationKey::new(key)),
        }
    }
}

fn component<'a>(kty: &str, value: &'a Option<String>, name: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .ok_or_else(|| format!("{kty} key missing '{name}' component"))
}

/// Parse a JWKS document into kid-indexed keys. Keys without a `kid` or with
/// unusable material are skipped with a warning.
fn parse_document(body: &str) -> Result<Vec<(String, VerificationKey)>, ConfigurationError> {
    let document: JwksDocument = serde_json::from_str(body)
        .map_err(|e| ConfigurationError::KeyFetch(format!("Failed to parse JWKS: {e}")))?;

    let mut keys = Vec::with_capacity(document.keys.len());
    for jwk in document.keys {
        let Some(kid) = jwk.kid.clone() else {
            debug!(kty = %jwk.kty, "Skipping JWK without kid");
            continue;
        };
        match jwk.to_verification_key() {
            Ok(key) => keys.push((kid, key)),
            Err(reason) => warn!(%kid, %reason, "Skipping unusable JWK"),
        }
    }
    Ok(keys)
}

#[derive(Debug, Clone)]
enum Source {
    Remote(String),
    Inline(String),
}

impl Source {
    fn describe(&self) -> &str {
        match self {
            Source::Remote(url) => url,
            Source::Inline(_) => "inline",
        }
    }
}

/// Refresh timestamps behind the lock.
struct RefreshState {
    last_refresh: Option<Instant>,
    last_refresh_attempt: Option<Instant>,
}

struct Inner {
    source: Source,
    client: reqwest::Client,
    keys: DashMap<String, VerificationKey>,
    state: RwLock<RefreshState>,
    refresh_lock: Mutex<()>,
    miss: Notify,
    min_refresh_interval: Duration,
}

/// A key set loaded from a JWKS document, indexed by `kid`.
///
/// The request path only reads the in-memory keys. A `kid` that is not in the
/// set wakes the background task started by [`JwksKeySet::spawn_refresh`],
/// which refetches the document at most once per minimum refresh interval.
/// A failed or empty refresh keeps the previous keys.
#[derive(Clone)]
pub struct JwksKeySet {
    inner: Arc<Inner>,
}

impl JwksKeySet {
    /// Load a key set from an `http(s)://` or `file://` URL.
    pub async fn fetch(url: impl Into<String>) -> Result<Self, ConfigurationError> {
        Self::fetch_with(url, reqwest::Client::new(), DEFAULT_MIN_REFRESH_INTERVAL).await
    }

    /// Load a key set using the given HTTP client and minimum refresh interval.
    pub async fn fetch_with(
        url: impl Into<String>,
        client: reqwest::Client,
        min_refresh_interval: Duration,
    ) -> Result<Self, ConfigurationError> {
        let set = Self::with_source(Source::Remote(url.into()), client, min_refresh_interval);
        set.refresh().await?;
        Ok(set)
    }

    /// Build a key set from an inline JWKS document.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let set = Self::with_source(
            Source::Inline(json.to_string()),
            reqwest::Client::new(),
            DEFAULT_MIN_REFRESH_INTERVAL,
        );
        let keys = parse_document(json)?;
        if keys.is_empty() {
            return Err(ConfigurationError::EmptyKeySet);
        }
        set.replace_keys(keys);
        Ok(set)
    }

    fn with_source(source: Source, client: reqwest::Client, min_refresh_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                client,
                keys: DashMap::new(),
                state: RwLock::new(RefreshState {
                    last_refresh: None,
                    last_refresh_attempt: None,
                }),
                refresh_lock: Mutex::new(()),
                miss: Notify::new(),
                min_refresh_interval,
            }),
        }
    }

    /// Where the keys come from: the URL, or `inline`.
    pub fn source(&self) -> &str {
        self.inner.source.describe()
    }

    pub fn len(&self) -> usize {
        self.inner.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.keys.is_empty()
    }

    /// Key ids currently loaded, sorted.
    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.inner.keys.iter().map(|e| e.key().clone()).collect();
        kids.sort_unstable();
        kids
    }

    /// Refetch the document and swap in its keys.
    ///
    /// On failure, or when the document holds no usable key, the current keys
    /// are kept and the error is returned.
    pub async fn refresh(&self) -> Result<usize, ConfigurationError> {
        let _guard = self.inner.refresh_lock.lock().await;
        let now = Instant::now();
        self.inner.state.write().await.last_refresh_attempt = Some(now);

        let result = match self.load().await {
            Ok(keys) if keys.is_empty() => Err(ConfigurationError::EmptyKeySet),
            Ok(keys) => Ok(self.replace_keys(keys)),
            Err(e) => Err(e),
        };

        match &result {
            Ok(count) => {
                self.inner.state.write().await.last_refresh = Some(now);
                info!(source = %self.source(), keys = count, "JWKS key set refreshed");
            }
            Err(e) => {
                warn!(source = %self.source(), error = %e, retained = self.len(), "JWKS refresh failed, keeping previous keys");
            }
        }
        result
    }

    /// Refresh unless one was attempted within the minimum interval.
    /// Unless `force`d, also skip when the keys are younger than `max_age`.
    async fn try_refresh(&self, force: bool, max_age: Duration) {
        {
            let state = self.inner.state.read().await;
            if !force && !is_stale(state.last_refresh, max_age) {
                return;
            }
            if !can_attempt(state.last_refresh_attempt, self.inner.min_refresh_interval) {
                debug!(source = %self.source(), "JWKS refresh skipped, attempted too recently");
                return;
            }
        }
        // Errors are logged by refresh; the previous keys stay in place.
        let _ = self.refresh().await;
    }

    /// Start the background refresh task.
    ///
    /// Refreshes every `interval`, and early when a request presented an
    /// unknown `kid`. Stops when `cancel` fires. A zero `interval` falls back
    /// to the minimum refresh interval.
    pub fn spawn_refresh(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = if interval.is_zero() {
            let fallback = if self.inner.min_refresh_interval.is_zero() {
                DEFAULT_MIN_REFRESH_INTERVAL
            } else {
                self.inner.min_refresh_interval
            };
            warn!(
                source = %self.source(),
                fallback_secs = fallback.as_secs(),
                "JWKS refresh interval is zero, using the minimum refresh interval"
            );
            fallback
        } else {
            interval
        };
        let set = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            // The first tick completes immediately; the keys were just loaded.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        debug!(source = %set.source(), "Periodic JWKS refresh");
                        set.try_refresh(false, interval).await;
                    }
                    _ = set.inner.miss.notified() => {
                        debug!(source = %set.source(), "JWKS refresh requested by unknown kid");
                        set.try_refresh(true, interval).await;
                    }
                    _ = cancel.cancelled() => {
                        break;
                    }
                }
            }
            info!(source = %set.source(), "JWKS refresh task stopped");
        })
    }

    async fn load(&self) -> Result<Vec<(String, VerificationKey)>, ConfigurationError> {
        let body = match &self.inner.source {
            Source::Inline(json) => json.clone(),
            Source::Remote(url) if url.starts_with("file:") => {
                let path = url::Url::parse(url)
                    .ok()
                    .and_then(|u| u.to_file_path().ok())
                    .ok_or_else(|| ConfigurationError::KeyFetch(format!("Invalid file URL: {url}")))?;
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| ConfigurationError::KeyFetch(format!("{}: {e}", path.display())))?
            }
            Source::Remote(url) => {
                let response = self
                    .inner
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| ConfigurationError::KeyFetch(e.to_string()))?;
                let response = response
                    .error_for_status()
                    .map_err(|e| ConfigurationError::KeyFetch(e.to_string()))?;
                response
                    .text()
                    .await
                    .map_err(|e| ConfigurationError::KeyFetch(e.to_string()))?
            }
        };
        parse_document(&body)
    }

    fn replace_keys(&self, keys: Vec<(String, VerificationKey)>) -> usize {
        let fresh: std::collections::HashSet<String> = keys.iter().map(|(kid, _)| kid.clone()).collect();
        for (kid, key) in keys {
            self.inner.keys.insert(kid, key);
        }
        self.inner.keys.retain(|kid, _| fresh.contains(kid));
        self.inner.keys.len()
    }
}

impl KeyResolver for JwksKeySet {
    fn resolve(&self, kid: Option<&str>) -> Option<VerificationKey> {
        let found = match kid {
            Some(kid) => self.inner.keys.get(kid).map(|entry| entry.value().clone()),
            None if self.inner.keys.len() == 1 => {
                self.inner.keys.iter().next().map(|entry| entry.value().clone())
            }
            None => None,
        };
        if found.is_none() {
            debug!(?kid, source = %self.source(), "Unknown kid, requesting JWKS refresh");
            self.inner.miss.notify_one();
        }
        found
    }

    fn describe(&self) -> String {
        format!("Jwks(url={})", self.source())
    }

    fn is_empty(&self) -> bool {
        self.inner.keys.is_empty()
    }
}

impl std::fmt::Debug for JwksKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksKeySet")
            .field("source", &self.source())
            .field("kids", &self.kids())
            .finish()
    }
}

fn is_stale(last_refresh: Option<Instant>, ttl: Duration) -> bool {
    match last_refresh {
        None => true,
        Some(ts) => ts.elapsed() >= ttl,
    }
}

fn can_attempt(last_attempt: Option<Instant>, min_interval: Duration) -> bool {
    match last_attempt {
        None => true,
        Some(ts) => ts.elapsed() >= min_interval,
    }
}
