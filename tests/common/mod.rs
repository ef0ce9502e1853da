//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use routeguard::security::{
    CacheSettings, DiscoveryDocument, FetchedMetadata, KeySet, MetadataError, MetadataFetcher,
    ProviderMetadataCache,
};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ISSUER: &str = "https://idp.routeguard.test";
pub const AUDIENCE: &str = "api://orders";
pub const JWKS_URI: &str = "https://idp.routeguard.test/keys";

pub const RSA_SIGNING_KEY: &str = include_str!("../fixtures/rsa_signing_key.pem");
pub const RSA_JWKS: &str = include_str!("../fixtures/rsa_jwks.json");

/// Manifest written to a temp file with the given extension, removed on drop.
pub fn manifest_file(content: &str, ext: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("routeguard_test_")
        .suffix(&format!(".{ext}"))
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

pub fn base64url_no_pad(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Standard claims for `ISSUER`/`AUDIENCE`, expiring in `exp_secs`.
pub fn claims(exp_secs: i64) -> Value {
    json!({
        "sub": "user-1",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now_secs() + exp_secs,
        "scope": "orders.read orders.write",
        "roles": ["clerk"]
    })
}

pub fn sign_hs256(secret: &[u8], kid: Option<&str>, claims: &Value) -> String {
    let header = Header {
        kid: kid.map(str::to_string),
        alg: Algorithm::HS256,
        ..Default::default()
    };
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

pub fn make_hs256_jwt(secret: &[u8], iss: &str, aud: &str, kid: &str, exp_secs: i64) -> String {
    let claims = json!({
        "sub": "user-1",
        "iss": iss,
        "aud": aud,
        "exp": now_secs() + exp_secs,
        "scope": "orders.read orders.write"
    });
    sign_hs256(secret, Some(kid), &claims)
}

pub fn sign_rs256(kid: Option<&str>, claims: &Value) -> String {
    let header = Header {
        kid: kid.map(str::to_string),
        alg: Algorithm::RS256,
        ..Default::default()
    };
    let key = EncodingKey::from_rsa_pem(RSA_SIGNING_KEY.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// JWK for an HMAC secret.
pub fn hs256_jwk(kid: &str, secret: &[u8]) -> Value {
    json!({
        "kty": "oct",
        "use": "sig",
        "alg": "HS256",
        "kid": kid,
        "k": base64url_no_pad(secret)
    })
}

pub fn jwks(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

pub fn rsa_jwks() -> Value {
    serde_json::from_str(RSA_JWKS).unwrap()
}

/// In-memory provider that counts fetches and can rotate keys or fail.
pub struct CountingFetcher {
    calls: AtomicUsize,
    jwks: Mutex<Value>,
    failing: AtomicBool,
    delay: Duration,
}

impl CountingFetcher {
    pub fn new(jwks: Value) -> Arc<Self> {
        Self::with_delay(jwks, Duration::ZERO)
    }

    pub fn with_delay(jwks: Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            jwks: Mutex::new(jwks),
            failing: AtomicBool::new(false),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_jwks(&self, jwks: Value) {
        *self.jwks.lock().unwrap() = jwks;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn cache(self: &Arc<Self>, settings: CacheSettings) -> Arc<ProviderMetadataCache> {
        let fetcher: Arc<dyn MetadataFetcher> = Arc::clone(self) as Arc<dyn MetadataFetcher>;
        Arc::new(ProviderMetadataCache::new(fetcher, settings))
    }
}

#[async_trait]
impl MetadataFetcher for CountingFetcher {
    async fn fetch(&self) -> Result<FetchedMetadata, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MetadataError::Fetch {
                url: format!("{ISSUER}/.well-known/openid-configuration"),
                message: "connection refused".to_string(),
            });
        }
        let jwks = self.jwks.lock().unwrap().clone();
        Ok(FetchedMetadata {
            document: DiscoveryDocument::new(ISSUER, JWKS_URI),
            keys: KeySet::from_jwks(&jwks),
        })
    }
}

/// Identity provider stand-in served over real HTTP on 127.0.0.1.
pub struct MockProvider {
    pub base: String,
    hits: Arc<AtomicUsize>,
}

impl MockProvider {
    /// Serve `responder(path, base)` as `(status, body)` for every request.
    pub fn start<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> (u16, String) + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let base = format!("http://127.0.0.1:{}", addr.port());
        let hits = Arc::new(AtomicUsize::new(0));

        let thread_base = base.clone();
        let thread_hits = Arc::clone(&hits);
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                thread_hits.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responder(request.url(), &thread_base);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .unwrap();
                let response = tiny_http::Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });
        Self { base, hits }
    }

    /// Discovery document at the well-known path naming `base` as issuer,
    /// `jwks` at `/keys`.
    pub fn serving(jwks: Value) -> Self {
        Self::start(move |path, base| match path {
            "/.well-known/openid-configuration" => {
                (200, discovery_json(base, &format!("{base}/keys")))
            }
            "/keys" => (200, jwks.to_string()),
            _ => (404, "{}".to_string()),
        })
    }

    pub fn discovery_url(&self) -> String {
        format!("{}/.well-known/openid-configuration", self.base)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn discovery_json(issuer: &str, jwks_uri: &str) -> String {
    json!({
        "issuer": issuer,
        "jwks_uri": jwks_uri,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "id_token_signing_alg_values_supported": ["RS256", "HS256"],
        "response_types_supported": ["code"]
    })
    .to_string()
}
