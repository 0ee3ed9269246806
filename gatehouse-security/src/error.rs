/// Per-request token verification failures.
///
/// Every variant is recoverable: the request carrying the token is rejected
/// and the process carries on. Variants stay distinct for logs and metrics,
/// but [`VerificationError::public_message`] is identical for all of them so
/// that callers cannot tell, for example, a disallowed algorithm from a bad
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationError {
    /// The token is not three valid base64url segments with a JSON header
    /// and a JSON object payload, or it exceeds the size limit.
    Malformed,

    /// The header declares an algorithm outside the allow-list (including `none`).
    UnsupportedAlgorithm,

    /// No verification key matches the header's key id and algorithm.
    KeyResolutionFailed,

    /// The signature does not verify against the resolved key.
    SignatureInvalid,

    /// The `exp` claim is in the past, beyond the clock-skew tolerance.
    Expired,

    /// The `nbf` claim is in the future, beyond the clock-skew tolerance.
    NotYetValid,

    /// The `iss` claim is missing or differs from the required issuer.
    IssuerMismatch,

    /// The `aud` claim is missing or does not contain the required audience.
    AudienceMismatch,

    /// The request carried no usable bearer token.
    MissingToken,

    /// The token verified but none of the username claims (nor `sub`) holds a value.
    MissingUsername,
}

impl std::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationError::Malformed => write!(f, "Token is malformed"),
            VerificationError::UnsupportedAlgorithm => write!(f, "Token uses an unsupported algorithm"),
            VerificationError::KeyResolutionFailed => write!(f, "No verification key matches the token"),
            VerificationError::SignatureInvalid => write!(f, "Token failed signature verification"),
            VerificationError::Expired => write!(f, "Token expired"),
            VerificationError::NotYetValid => write!(f, "Token is not yet valid"),
            VerificationError::IssuerMismatch => write!(f, "Token issuer mismatch"),
            VerificationError::AudienceMismatch => write!(f, "Token audience mismatch"),
            VerificationError::MissingToken => write!(f, "No bearer token provided"),
            VerificationError::MissingUsername => write!(f, "No username found in token"),
        }
    }
}

impl std::error::Error for VerificationError {}

impl VerificationError {
    /// The message safe to expose to remote callers. Identical for every variant.
    pub fn public_message(&self) -> &'static str {
        "Unauthorized"
    }

    /// Whether the request itself was incomplete, as opposed to carrying a bad token.
    pub fn is_client_error(&self) -> bool {
        matches!(self, VerificationError::MissingToken)
    }
}

/// Configuration errors raised while building exclusions, keys, or parsers.
///
/// These are fatal to startup and never produced on the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A path exclusion pattern is blank, excludes everything, or uses
    /// wildcards that do not span whole segments.
    InvalidPattern { pattern: String, reason: &'static str },

    /// No verification key was configured, or a key set contains no usable key.
    EmptyKeySet,

    /// An algorithm name is unknown or not allowed (`none`).
    UnknownAlgorithm(String),

    /// The algorithm allow-list is empty.
    NoAlgorithms,

    /// Key material could not be decoded.
    InvalidKey(String),

    /// A remote or file key set could not be loaded.
    KeyFetch(String),

    /// A configuration value is out of range.
    InvalidValue { key: &'static str, reason: String },

    /// The configuration document could not be parsed.
    Load(String),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid path exclusion '{pattern}': {reason}")
            }
            ConfigurationError::EmptyKeySet => write!(f, "No verification keys configured"),
            ConfigurationError::UnknownAlgorithm(name) => write!(f, "Unknown JWT algorithm: {name}"),
            ConfigurationError::NoAlgorithms => write!(f, "No allowed JWT algorithms configured"),
            ConfigurationError::InvalidKey(msg) => write!(f, "Invalid key: {msg}"),
            ConfigurationError::KeyFetch(msg) => write!(f, "Key set fetch error: {msg}"),
            ConfigurationError::InvalidValue { key, reason } => {
                write!(f, "Invalid value for '{key}': {reason}")
            }
            ConfigurationError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigurationError {}
