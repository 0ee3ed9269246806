pub mod authenticator;
pub mod claims;
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod error;
pub mod exclusion;
pub mod jwks;
pub mod keys;
pub mod parser;
pub mod roles;
pub mod source;

// Re-export primary public types for convenience.
pub use authenticator::{AuthDecision, AuthenticatedCaller, Authenticator};
pub use claims::{ClaimPath, TokenId, VerifiedClaims};
pub use config::{KeySourceConfig, SecurityConfig};
pub use decoder::TokenDecoder;
pub use discovery::DiscoveryDocument;
pub use error::{ConfigurationError, VerificationError};
pub use exclusion::{ExclusionSet, PathPattern, PatternKind};
pub use jwks::JwksKeySet;
pub use keys::{KeyResolver, KeySet, StaticKey, VerificationKey};
pub use parser::{Parser, ParserBuilder, ParserConfig};
pub use roles::{
    ClaimRoleExtractor, Composite, Merge, RoleCache, RoleExtractor, RoleSet, RolesResolver,
};
pub use source::HeaderSource;

// Algorithm names appear throughout the public API.
pub use jsonwebtoken::Algorithm;

pub mod prelude {
    //! Re-exports of the most commonly used security types.
    pub use crate::{
        AuthDecision, Authenticator, ExclusionSet, Parser, ParserBuilder, RoleCache,
        RolesResolver, SecurityConfig, VerificationError, VerificationKey, VerifiedClaims,
    };
}
