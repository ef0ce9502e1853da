use async_trait::async_trait;
use base64::Engine;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use routeguard::registry::{HandlerDefinition, HandlerGroup, PolicyRegistry};
use routeguard::security::{
    extract_bearer, AuthorizationPolicy, CacheSettings, DiscoveryDocument, FetchedMetadata,
    KeySet, MetadataError, MetadataFetcher, ProviderMetadataCache, TokenValidationParameters,
};
use routeguard::RouteGuard;
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

const ISSUER: &str = "https://issuer.example";
const AUDIENCE: &str = "my-audience";
const SECRET: &[u8] = b"supersecret-supersecret-1234567";

/// Serves a fixed HS256 key set without any I/O.
struct StaticFetcher;

#[async_trait]
impl MetadataFetcher for StaticFetcher {
    async fn fetch(&self) -> Result<FetchedMetadata, MetadataError> {
        let k = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(SECRET);
        let jwks = json!({ "keys": [{"kty": "oct", "alg": "HS256", "kid": "k1", "k": k}] });
        Ok(FetchedMetadata {
            document: DiscoveryDocument::new(ISSUER, format!("{ISSUER}/keys")),
            keys: KeySet::from_jwks(&jwks),
        })
    }
}

fn registry(handlers: usize) -> PolicyRegistry {
    let mut group = HandlerGroup::new("Bench")
        .authorize(AuthorizationPolicy::authenticated().with_scopes(["read"]));
    for i in 0..handlers {
        let mut def = HandlerDefinition::http(format!("Handler{i}"), None);
        if i % 4 == 0 {
            def = def.allow_anonymous();
        }
        group = group.handler(def);
    }
    PolicyRegistry::build(&vec![group]).unwrap()
}

fn make_token(exp_secs: i64) -> String {
    let header = Header {
        kid: Some("k1".to_string()),
        alg: Algorithm::HS256,
        ..Default::default()
    };
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = json!({
        "sub": "bench",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now + exp_secs,
        "scope": "read write"
    });
    jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

fn bench_policy_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_for");
    for size in [10, 100, 1000] {
        let registry = registry(size);
        let protected = format!("Handler{}", size - 1);
        group.bench_with_input(BenchmarkId::new("protected", size), &size, |b, _| {
            b.iter(|| black_box(registry.policy_for(black_box(&protected))))
        });
        group.bench_with_input(BenchmarkId::new("unknown", size), &size, |b, _| {
            b.iter(|| black_box(registry.policy_for(black_box("NotAHandler"))))
        });
    }
    group.finish();
}

fn bench_extract_bearer(c: &mut Criterion) {
    let headers = bearer(&make_token(3600));
    c.bench_function("extract_bearer", |b| {
        b.iter(|| black_box(extract_bearer(black_box(&headers))))
    });
}

fn bench_authorize(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = Arc::new(ProviderMetadataCache::new(
        Arc::new(StaticFetcher),
        CacheSettings::default(),
    ));
    let validator = routeguard::security::TokenValidator::new(
        cache,
        TokenValidationParameters::new(ISSUER, AUDIENCE),
    );
    let guard = RouteGuard::new(Arc::new(registry(100)), validator);
    let headers = bearer(&make_token(3600));

    // warm the metadata cache
    assert!(rt.block_on(guard.authorize("Handler1", &headers)).is_allowed());

    c.bench_function("authorize_protected_warm_cache", |b| {
        b.iter(|| black_box(rt.block_on(guard.authorize(black_box("Handler1"), &headers))))
    });
    c.bench_function("authorize_public", |b| {
        b.iter(|| black_box(rt.block_on(guard.authorize(black_box("Handler0"), &headers))))
    });
}

criterion_group!(benches, bench_policy_lookup, bench_extract_bearer, bench_authorize);
criterion_main!(benches);
