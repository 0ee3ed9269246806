//! Gatehouse — the authentication core of a request filter.
//!
//! Decides whether a request path needs a token, verifies the bearer token's
//! signature and standard claims, and answers role-membership questions from
//! a bounded cache. This facade re-exports the sub-crates through feature
//! flags:
//!
//! ```ignore
//! use gatehouse::prelude::*;
//!
//! let config = SecurityConfig::from_yaml_str(&yaml)?;
//! let auth = Authenticator::from_config(&config).await?;
//!
//! let decision = auth.authenticate(path, bearer);
//! if auth.has_role(&decision, "admin")? { /* ... */ }
//! ```
//!
//! # Feature flags
//!
//! | Feature    | Default | Crate                |
//! |------------|---------|----------------------|
//! | `security` | **yes** | `gatehouse-security` |
//! | `cache`    | **yes** | `gatehouse-cache`    |

#[cfg(feature = "cache")]
pub use gatehouse_cache;

#[cfg(feature = "security")]
pub use gatehouse_security;

#[cfg(feature = "cache")]
pub use gatehouse_cache::BoundedCache;

/// Unified prelude — import everything with `use gatehouse::prelude::*`.
pub mod prelude {
    #[cfg(feature = "cache")]
    pub use gatehouse_cache::BoundedCache;

    #[cfg(feature = "security")]
    pub use gatehouse_security::prelude::*;
}
