//! Identity provider metadata: the discovery document, the signing keys it
//! points to, and the process-wide cache that keeps both current.

mod cache;
mod fetch;
mod jwks;

pub use cache::{
    CacheSettings, CacheStats, ProviderMetadataCache, DEFAULT_FETCH_TIMEOUT, DEFAULT_METADATA_TTL,
    DEFAULT_MIN_REFRESH_INTERVAL, DEFAULT_STALE_GRACE,
};
pub(crate) use fetch::check_endpoint_url;
pub use fetch::{FetchedMetadata, HttpMetadataFetcher, MetadataFetcher};
pub use jwks::{KeyFamily, KeySet, SigningKey};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// OpenID Connect discovery document (`/.well-known/openid-configuration`).
///
/// Only `issuer` and `jwks_uri` are required; everything else the provider
/// publishes is kept in `other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl DiscoveryDocument {
    pub fn new(issuer: impl Into<String>, jwks_uri: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_uri: jwks_uri.into(),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            end_session_endpoint: None,
            id_token_signing_alg_values_supported: Vec::new(),
            other: BTreeMap::new(),
        }
    }
}

/// One published snapshot of provider metadata.
///
/// Snapshots are immutable; a refresh publishes a new one with a higher
/// `revision`.
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    pub document: DiscoveryDocument,
    pub keys: KeySet,
    pub revision: u64,
    pub fetched_at: Instant,
}

impl ProviderMetadata {
    pub fn issuer(&self) -> &str {
        &self.document.issuer
    }

    pub fn jwks_uri(&self) -> &str {
        &self.document.jwks_uri
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Why provider metadata could not be obtained.
///
/// Every variant means "cannot authenticate right now"; none of them says
/// anything about the token being checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// Transport failure talking to the provider.
    Fetch { url: String, message: String },
    /// The provider answered with a non-success status.
    Status { url: String, status: u16 },
    /// The response body is not a usable discovery document or key set.
    Parse { url: String, message: String },
    /// The fetch did not complete within the configured timeout.
    Timeout(Duration),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Fetch { url, message } => {
                write!(f, "failed to fetch {url}: {message}")
            }
            MetadataError::Status { url, status } => {
                write!(f, "{url} returned HTTP {status}")
            }
            MetadataError::Parse { url, message } => {
                write!(f, "invalid document at {url}: {message}")
            }
            MetadataError::Timeout(after) => {
                write!(f, "provider metadata fetch timed out after {after:?}")
            }
        }
    }
}

impl std::error::Error for MetadataError {}
