//! # Guard Configuration
//!
//! Bootstrap configuration for [`RouteGuard`](crate::RouteGuard): which tokens
//! to trust and where the identity provider publishes its metadata.
//!
//! Three ways to obtain a [`GuardConfig`]:
//!
//! - [`GuardConfig::for_issuer`] for the common case: trusted issuer plus
//!   audience, discovery document at `{issuer}/.well-known/openid-configuration`
//! - [`GuardConfig::builder`] for custom validation parameters; both the
//!   validation parameters and a discovery URL must be supplied
//! - [`GuardConfig::from_env`] for deployments
//!
//! ## Environment Variables
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `ROUTEGUARD_ISSUER` | trusted issuer | issuer from the discovery document |
//! | `ROUTEGUARD_AUDIENCE` | expected audience(s), comma separated | required |
//! | `ROUTEGUARD_DISCOVERY_URL` | discovery document URL | derived from the issuer |
//! | `ROUTEGUARD_LEEWAY_SECS` | clock skew tolerance | `30` |
//! | `ROUTEGUARD_METADATA_TTL_SECS` | metadata refresh period | `3600` |
//! | `ROUTEGUARD_MIN_REFRESH_INTERVAL_SECS` | minimum time between forced refreshes | `30` |
//! | `ROUTEGUARD_FETCH_TIMEOUT_MS` | discovery fetch timeout | `5000` |
//! | `ROUTEGUARD_STALE_GRACE_SECS` | stale snapshot use during an outage | `300` |

use crate::security::metadata::check_endpoint_url;
use crate::security::{
    CacheSettings, HttpMetadataFetcher, MetadataFetcher, ProviderMetadataCache,
    TokenValidationParameters,
};
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_ISSUER: &str = "ROUTEGUARD_ISSUER";
pub const ENV_AUDIENCE: &str = "ROUTEGUARD_AUDIENCE";
pub const ENV_DISCOVERY_URL: &str = "ROUTEGUARD_DISCOVERY_URL";
pub const ENV_LEEWAY_SECS: &str = "ROUTEGUARD_LEEWAY_SECS";
pub const ENV_METADATA_TTL_SECS: &str = "ROUTEGUARD_METADATA_TTL_SECS";
pub const ENV_MIN_REFRESH_INTERVAL_SECS: &str = "ROUTEGUARD_MIN_REFRESH_INTERVAL_SECS";
pub const ENV_FETCH_TIMEOUT_MS: &str = "ROUTEGUARD_FETCH_TIMEOUT_MS";
pub const ENV_STALE_GRACE_SECS: &str = "ROUTEGUARD_STALE_GRACE_SECS";

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Configuration problems detected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No token validation parameters were supplied.
    MissingTokenValidation,
    /// No discovery document location was supplied.
    MissingDiscovery,
    /// Token validation parameters name no audience, or an empty one.
    MissingAudience,
    /// The trusted issuer is set but empty.
    EmptyIssuer,
    /// No signing algorithm is allowed.
    NoAlgorithms,
    /// The discovery URL is malformed or not secure.
    InvalidDiscoveryUrl { url: String, reason: String },
    /// An environment variable holds an unusable value.
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
    /// The discovery fetch timeout is zero.
    ZeroFetchTimeout,
    /// The HTTP client for the provider could not be created.
    HttpClient(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingTokenValidation => write!(
                f,
                "configuration error: token validation parameters are required \
                (trusted issuer and audience, or custom parameters)"
            ),
            ConfigError::MissingDiscovery => write!(
                f,
                "configuration error: a discovery document location is required"
            ),
            ConfigError::MissingAudience => write!(
                f,
                "configuration error: at least one expected audience is required"
            ),
            ConfigError::EmptyIssuer => {
                write!(f, "configuration error: trusted issuer must not be empty")
            }
            ConfigError::NoAlgorithms => write!(
                f,
                "configuration error: at least one signing algorithm must be allowed"
            ),
            ConfigError::InvalidDiscoveryUrl { url, reason } => {
                write!(f, "configuration error: discovery URL '{url}' rejected: {reason}")
            }
            ConfigError::InvalidEnv { var, value, reason } => {
                write!(f, "configuration error: {var}='{value}' is invalid: {reason}")
            }
            ConfigError::ZeroFetchTimeout => {
                write!(f, "configuration error: discovery fetch timeout must be positive")
            }
            ConfigError::HttpClient(e) => {
                write!(f, "configuration error: cannot create HTTP client: {e}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Where and how provider metadata is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub url: String,
    pub cache: CacheSettings,
}

impl DiscoveryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache: CacheSettings::default(),
        }
    }
}

/// Complete bootstrap configuration of the authorization layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub validation: TokenValidationParameters,
    pub discovery: DiscoveryConfig,
}

impl GuardConfig {
    /// Trust tokens from `issuer` for `audience`, discovering metadata at the
    /// issuer's well-known location.
    pub fn for_issuer(
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let issuer = issuer.into();
        let discovery_url = well_known_url(&issuer);
        Self::builder()
            .token_validation(TokenValidationParameters::new(issuer, audience))
            .discovery_url(discovery_url)
            .build()
    }

    pub fn builder() -> GuardConfigBuilder {
        GuardConfigBuilder::default()
    }

    /// Load from `ROUTEGUARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let issuer = get(ENV_ISSUER);
        let audiences: Vec<String> = get(ENV_AUDIENCE)
            .map(|a| {
                a.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let discovery_url =
            get(ENV_DISCOVERY_URL).or_else(|| issuer.as_deref().map(well_known_url));

        let mut builder = Self::builder();
        if issuer.is_some() || !audiences.is_empty() {
            let mut params = match &issuer {
                Some(iss) => TokenValidationParameters::new(iss.clone(), String::new()),
                None => TokenValidationParameters::for_discovered_issuer(String::new()),
            };
            params.valid_audiences = audiences;
            if let Some(secs) = parse_env::<u64>(ENV_LEEWAY_SECS, get(ENV_LEEWAY_SECS))? {
                params.leeway_secs = secs;
            }
            builder = builder.token_validation(params);
        }
        if let Some(url) = discovery_url {
            builder = builder.discovery_url(url);
        }
        if let Some(secs) = parse_env::<u64>(ENV_METADATA_TTL_SECS, get(ENV_METADATA_TTL_SECS))? {
            builder = builder.metadata_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env::<u64>(
            ENV_MIN_REFRESH_INTERVAL_SECS,
            get(ENV_MIN_REFRESH_INTERVAL_SECS),
        )? {
            builder = builder.min_refresh_interval(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_env::<u64>(ENV_FETCH_TIMEOUT_MS, get(ENV_FETCH_TIMEOUT_MS))? {
            builder = builder.fetch_timeout(Duration::from_millis(ms));
        }
        if let Some(secs) = parse_env::<u64>(ENV_STALE_GRACE_SECS, get(ENV_STALE_GRACE_SECS))? {
            builder = builder.stale_grace(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Check every setting; called by the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validation.valid_issuer.as_deref().is_some_and(|i| i.trim().is_empty()) {
            return Err(ConfigError::EmptyIssuer);
        }
        let audiences = &self.validation.valid_audiences;
        if audiences.is_empty() || audiences.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::MissingAudience);
        }
        if self.validation.algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        check_endpoint_url(&self.discovery.url).map_err(|reason| {
            ConfigError::InvalidDiscoveryUrl {
                url: self.discovery.url.clone(),
                reason,
            }
        })?;
        if self.discovery.cache.fetch_timeout.is_zero() {
            return Err(ConfigError::ZeroFetchTimeout);
        }
        Ok(())
    }

    /// HTTP-backed metadata cache for this configuration.
    pub fn metadata_cache(&self) -> Result<Arc<ProviderMetadataCache>, ConfigError> {
        let timeout = self.discovery.cache.fetch_timeout;
        let fetcher = HttpMetadataFetcher::new(&self.discovery.url, timeout)
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let fetcher: Arc<dyn MetadataFetcher> = Arc::new(fetcher);
        Ok(Arc::new(ProviderMetadataCache::new(
            fetcher,
            self.discovery.cache,
        )))
    }
}

fn well_known_url(issuer: &str) -> String {
    format!("{}{WELL_KNOWN_PATH}", issuer.trim_end_matches('/'))
}

fn parse_env<T>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match value {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnv {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

/// Builder for a custom [`GuardConfig`].
///
/// ```rust
/// use routeguard::config::GuardConfig;
/// use routeguard::security::TokenValidationParameters;
/// use std::time::Duration;
///
/// let config = GuardConfig::builder()
///     .token_validation(
///         TokenValidationParameters::new("https://idp.example.com", "api").leeway(10),
///     )
///     .discovery_url("https://idp.example.com/.well-known/openid-configuration")
///     .metadata_ttl(Duration::from_secs(600))
///     .build()
///     .unwrap();
/// assert_eq!(config.validation.leeway_secs, 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GuardConfigBuilder {
    validation: Option<TokenValidationParameters>,
    discovery_url: Option<String>,
    cache: CacheSettings,
}

impl GuardConfigBuilder {
    pub fn token_validation(mut self, params: TokenValidationParameters) -> Self {
        self.validation = Some(params);
        self
    }

    pub fn discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = Some(url.into());
        self
    }

    pub fn metadata_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.cache.min_refresh_interval = interval;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.cache.fetch_timeout = timeout;
        self
    }

    pub fn stale_grace(mut self, grace: Duration) -> Self {
        self.cache.stale_grace = grace;
        self
    }

    /// # Errors
    ///
    /// [`ConfigError::MissingTokenValidation`] or
    /// [`ConfigError::MissingDiscovery`] when either part was not supplied,
    /// otherwise whatever [`GuardConfig::validate`] finds.
    pub fn build(self) -> Result<GuardConfig, ConfigError> {
        let validation = self.validation.ok_or(ConfigError::MissingTokenValidation)?;
        let url = self.discovery_url.ok_or(ConfigError::MissingDiscovery)?;
        let config = GuardConfig {
            validation,
            discovery: DiscoveryConfig {
                url,
                cache: self.cache,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_for_issuer_derives_discovery_url() {
        let config = GuardConfig::for_issuer("https://login.example.com/tenant/", "api").unwrap();
        assert_eq!(
            config.discovery.url,
            "https://login.example.com/tenant/.well-known/openid-configuration"
        );
        assert_eq!(
            config.validation.valid_issuer.as_deref(),
            Some("https://login.example.com/tenant/")
        );
        assert_eq!(config.discovery.cache, CacheSettings::default());
    }

    #[test]
    fn test_builder_requires_both_parts() {
        let err = GuardConfig::builder()
            .discovery_url("https://idp.example.com/.well-known/openid-configuration")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingTokenValidation);

        let err = GuardConfig::builder()
            .token_validation(TokenValidationParameters::new("https://idp.example.com", "api"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingDiscovery);
    }

    #[test]
    fn test_insecure_discovery_url_rejected() {
        let err = GuardConfig::for_issuer("http://idp.example.com", "api").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDiscoveryUrl { .. }));
        assert!(GuardConfig::for_issuer("http://localhost:8080", "api").is_ok());
        assert!(GuardConfig::for_issuer("http://localhost.attacker.com", "api").is_err());
    }

    #[test]
    fn test_empty_audience_and_issuer_rejected() {
        let err = GuardConfig::for_issuer("https://idp.example.com", " ").unwrap_err();
        assert_eq!(err, ConfigError::MissingAudience);

        let mut params = TokenValidationParameters::new("https://idp.example.com", "api");
        params.valid_audiences.clear();
        let err = GuardConfig::builder()
            .token_validation(params)
            .discovery_url("https://idp.example.com/.well-known/openid-configuration")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingAudience);

        let err = GuardConfig::for_issuer("  ", "api").unwrap_err();
        assert_eq!(err, ConfigError::EmptyIssuer);
    }

    #[test]
    fn test_from_lookup_full() {
        let config = GuardConfig::from_lookup(lookup(&[
            (ENV_ISSUER, "https://idp.example.com"),
            (ENV_AUDIENCE, "api, web ,"),
            (ENV_LEEWAY_SECS, "5"),
            (ENV_METADATA_TTL_SECS, "60"),
            (ENV_MIN_REFRESH_INTERVAL_SECS, "2"),
            (ENV_FETCH_TIMEOUT_MS, "750"),
            (ENV_STALE_GRACE_SECS, "0"),
        ]))
        .unwrap();
        assert_eq!(config.validation.valid_audiences, vec!["api", "web"]);
        assert_eq!(config.validation.leeway_secs, 5);
        assert_eq!(
            config.discovery.url,
            "https://idp.example.com/.well-known/openid-configuration"
        );
        assert_eq!(config.discovery.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.discovery.cache.min_refresh_interval, Duration::from_secs(2));
        assert_eq!(config.discovery.cache.stale_grace, Duration::ZERO);
        assert_eq!(config.discovery.cache.fetch_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_from_lookup_discovery_only_trusts_discovered_issuer() {
        let config = GuardConfig::from_lookup(lookup(&[
            (ENV_AUDIENCE, "api"),
            (ENV_DISCOVERY_URL, "https://idp.example.com/custom/openid"),
        ]))
        .unwrap();
        assert!(config.validation.valid_issuer.is_none());
        assert_eq!(config.discovery.url, "https://idp.example.com/custom/openid");
    }

    #[test]
    fn test_from_lookup_errors() {
        assert_eq!(
            GuardConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::MissingTokenValidation
        );
        assert_eq!(
            GuardConfig::from_lookup(lookup(&[(ENV_AUDIENCE, "api")])).unwrap_err(),
            ConfigError::MissingDiscovery
        );
        let err = GuardConfig::from_lookup(lookup(&[
            (ENV_ISSUER, "https://idp.example.com"),
            (ENV_AUDIENCE, "api"),
            (ENV_LEEWAY_SECS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: ENV_LEEWAY_SECS,
                ..
            }
        ));
    }
}
