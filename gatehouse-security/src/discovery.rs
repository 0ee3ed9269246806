//! OpenID Connect discovery.
//!
//! Resolves a provider's `jwks_uri` (and `issuer`) from its
//! `.well-known/openid-configuration` document, once at startup. The keys
//! themselves are then loaded and refreshed by [`JwksKeySet`](crate::jwks::JwksKeySet).

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ConfigurationError;

/// Standard path suffix of the discovery endpoint.
pub const WELL_KNOWN_OPENID_CONFIGURATION: &str = "/.well-known/openid-configuration";

/// The parts of an OpenID Connect discovery document used for verification.
/// Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
}

impl DiscoveryDocument {
    /// Fetch and parse the discovery document at `url`.
    ///
    /// Fails when the endpoint is unreachable, answers with an error status,
    /// or publishes no `jwks_uri`.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self, ConfigurationError> {
        if !url.ends_with(WELL_KNOWN_OPENID_CONFIGURATION) {
            warn!(
                %url,
                expected_suffix = WELL_KNOWN_OPENID_CONFIGURATION,
                "Non-standard OpenID Connect discovery endpoint"
            );
        }

        let response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(%url, error = %e, "OpenID Connect discovery request failed");
                ConfigurationError::KeyFetch(format!("OpenID Connect discovery failed: {e}"))
            })?;
        let document: DiscoveryDocument = response.json().await.map_err(|e| {
            ConfigurationError::KeyFetch(format!("Invalid OpenID Connect configuration: {e}"))
        })?;

        match document.jwks_uri.as_deref().map(str::trim) {
            Some(jwks_uri) if !jwks_uri.is_empty() => {
                info!(%url, %jwks_uri, issuer = ?document.issuer, "Discovered JWKS endpoint");
                Ok(document)
            }
            _ => {
                warn!(%url, "OpenID Connect configuration did not specify a jwks_uri");
                Err(ConfigurationError::KeyFetch(format!(
                    "OpenID Connect configuration at {url} has no jwks_uri"
                )))
            }
        }
    }

    /// The published JWKS URL. Present on any document returned by [`fetch`](Self::fetch).
    pub fn jwks_uri(&self) -> Option<&str> {
        self.jwks_uri.as_deref().map(str::trim)
    }
}
