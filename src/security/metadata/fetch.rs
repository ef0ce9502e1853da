use super::{DiscoveryDocument, KeySet, MetadataError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Raw result of one fetch: the discovery document and the keys behind its
/// `jwks_uri`.
#[derive(Debug, Clone)]
pub struct FetchedMetadata {
    pub document: DiscoveryDocument,
    pub keys: KeySet,
}

/// Retrieves provider metadata from its source of truth.
///
/// [`ProviderMetadataCache`](super::ProviderMetadataCache) decides when to
/// call this; implementations just fetch.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self) -> Result<FetchedMetadata, MetadataError>;
}

/// Parse `raw` as an endpoint URL the provider may be reached at.
///
/// HTTPS is always accepted. Plain HTTP only for the exact hosts `localhost`
/// and `127.0.0.1`, so `http://localhost.attacker.com` is rejected.
pub(crate) fn check_endpoint_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("'{raw}' is not a valid URL: {e}"))?;
    match url.scheme() {
        "https" => Ok(url),
        "http" => match url.host_str() {
            Some("localhost" | "127.0.0.1") => Ok(url),
            Some(_) => Err(format!(
                "'{raw}' must use HTTPS (HTTP only allowed for localhost/127.0.0.1)"
            )),
            None => Err(format!("'{raw}' has no host")),
        },
        other => Err(format!("'{raw}' uses unsupported scheme '{other}'")),
    }
}

/// Fetches the OpenID Connect discovery document, then the JWKS it names.
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
    discovery_url: String,
}

impl HttpMetadataFetcher {
    /// `timeout` bounds each individual HTTP request.
    pub fn new(discovery_url: impl Into<String>, timeout: Duration) -> Result<Self, MetadataError> {
        let discovery_url = discovery_url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetadataError::Fetch {
                url: discovery_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self::with_client(client, discovery_url))
    }

    pub fn with_client(client: reqwest::Client, discovery_url: impl Into<String>) -> Self {
        Self {
            client,
            discovery_url: discovery_url.into(),
        }
    }

    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    async fn get_json(&self, url: &str) -> Result<Value, MetadataError> {
        let response = self
            .client
            .get(url)
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| MetadataError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(|e| MetadataError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_slice(&body).map_err(|e| MetadataError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self) -> Result<FetchedMetadata, MetadataError> {
        let start = Instant::now();
        let raw = self.get_json(&self.discovery_url).await?;
        let document: DiscoveryDocument =
            serde_json::from_value(raw).map_err(|e| MetadataError::Parse {
                url: self.discovery_url.clone(),
                message: e.to_string(),
            })?;

        check_endpoint_url(&document.jwks_uri).map_err(|message| MetadataError::Parse {
            url: self.discovery_url.clone(),
            message: format!("jwks_uri {message}"),
        })?;

        let jwks = self.get_json(&document.jwks_uri).await?;
        if !jwks.get("keys").is_some_and(Value::is_array) {
            return Err(MetadataError::Parse {
                url: document.jwks_uri.clone(),
                message: "missing 'keys' array".to_string(),
            });
        }
        let keys = KeySet::from_jwks(&jwks);

        debug!(
            issuer = %document.issuer,
            keys = keys.len(),
            elapsed = ?start.elapsed(),
            "fetched provider metadata"
        );
        Ok(FetchedMetadata { document, keys })
    }
}
