use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use tracing::debug;

use crate::error::VerificationError;

/// Algorithm names the decoder recognises. `none` is deliberately absent.
const ALGORITHM_NAMES: &[&str] = &[
    "HS256", "HS384", "HS512", "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256",
    "ES384", "EdDSA",
];

/// JOSE header fields the verifier needs.
#[derive(Debug, Deserialize)]
pub(crate) struct RawHeader {
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub kid: Option<String>,
}

/// A structurally valid token, not yet trusted.
#[derive(Debug)]
pub(crate) struct DecodedToken {
    pub header: RawHeader,
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Reusable token decoding component: the base64url engine and the
/// algorithm-name table.
///
/// Parsers built without an explicit decoder allocate their own; sharing one
/// via [`TokenDecoder::shared`] only saves that construction cost and never
/// changes a verification outcome.
#[derive(Debug)]
pub struct TokenDecoder {
    engine: GeneralPurpose,
    algorithms: HashMap<&'static str, Algorithm>,
}

impl Default for TokenDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenDecoder {
    pub fn new() -> Self {
        let engine = GeneralPurpose::new(
            &alphabet::URL_SAFE,
            GeneralPurposeConfig::new()
                .with_encode_padding(false)
                .with_decode_padding_mode(DecodePaddingMode::Indifferent),
        );
        let algorithms = ALGORITHM_NAMES
            .iter()
            .filter_map(|name| Algorithm::from_str(name).ok().map(|alg| (*name, alg)))
            .collect();
        Self { engine, algorithms }
    }

    /// The process-wide shared decoder.
    pub fn shared() -> Arc<TokenDecoder> {
        static SHARED: OnceLock<Arc<TokenDecoder>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(TokenDecoder::new())).clone()
    }

    /// Look up an algorithm by its JOSE name. Unknown names and `none` yield `None`.
    pub fn algorithm(&self, name: &str) -> Option<Algorithm> {
        self.algorithms.get(name).copied()
    }

    /// Split and decode `header.payload.signature`.
    ///
    /// Checks that there are exactly three segments, that header and payload
    /// are non-empty, that each segment is valid base64url, that the header is a JSON object and that the payload
    /// is a JSON object. Nothing here is trusted yet.
    pub(crate) fn decode(&self, token: &str) -> Result<DecodedToken, VerificationError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            debug!("Token rejected: expected three segments");
            return Err(VerificationError::Malformed);
        };
        // An empty signature is structurally fine (`alg: none`); it is refused later.
        if header.is_empty() || payload.is_empty() {
            debug!("Token rejected: empty segment");
            return Err(VerificationError::Malformed);
        }

        let header_bytes = self.decode_segment(header)?;
        let payload_bytes = self.decode_segment(payload)?;
        self.decode_segment(signature)?;

        let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
            debug!(error = %e, "Failed to parse token header JSON");
            VerificationError::Malformed
        })?;
        let claims: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&payload_bytes).map_err(|e| {
                debug!(error = %e, "Failed to parse token payload JSON");
                VerificationError::Malformed
            })?;

        Ok(DecodedToken { header, claims })
    }

    fn decode_segment(&self, segment: &str) -> Result<Vec<u8>, VerificationError> {
        self.engine.decode(segment).map_err(|e| {
            debug!(error = %e, "Failed to decode token segment base64");
            VerificationError::Malformed
        })
    }
}
