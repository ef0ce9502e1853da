//! # Security Module
//!
//! Everything needed to turn an inbound request into an authenticated
//! principal and check it against a handler's policy:
//!
//! - [`extract_bearer`] pulls the credential out of the `Authorization` header
//! - [`ProviderMetadataCache`] keeps the identity provider's discovery
//!   document and signing keys current
//! - [`TokenValidator`] verifies signature, issuer, audience and lifetime
//! - [`AuthorizationPolicy`] decides whether the validated [`Claims`] are
//!   enough for a handler
//!
//! ## Key rotation
//!
//! Tokens name their signing key with `kid`. When the cached key set does not
//! contain it, the validator asks the cache for one forced refresh and retries
//! once. Forced refreshes are single-flight and rate limited, so a flood of
//! tokens with made-up key IDs costs at most one fetch per
//! [`CacheSettings::min_refresh_interval`].
//!
//! ```rust,no_run
//! use routeguard::security::{
//!     CacheSettings, HttpMetadataFetcher, ProviderMetadataCache, TokenValidationParameters,
//!     TokenValidator,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpMetadataFetcher::new(
//!     "https://login.example.com/.well-known/openid-configuration",
//!     Duration::from_secs(5),
//! )?;
//! let cache = Arc::new(ProviderMetadataCache::new(Arc::new(fetcher), CacheSettings::default()));
//! let validator = TokenValidator::new(
//!     cache,
//!     TokenValidationParameters::new("https://login.example.com", "api://orders"),
//! );
//! let outcome = validator.validate("eyJhbGciOi...").await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

mod claims;
mod extract;
pub mod metadata;
mod policy;
mod validator;

pub use claims::Claims;
pub use extract::{extract_bearer, Credential};
pub use metadata::{
    CacheSettings, CacheStats, DiscoveryDocument, FetchedMetadata, HttpMetadataFetcher, KeySet,
    MetadataError, MetadataFetcher, ProviderMetadata, ProviderMetadataCache,
};
pub use policy::{AuthorizationPolicy, PolicyCatalog};
pub use validator::{
    AuthenticationOutcome, RejectReason, TokenValidationParameters, TokenValidator,
    DEFAULT_ALGORITHMS, DEFAULT_LEEWAY_SECS,
};
