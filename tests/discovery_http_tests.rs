use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use routeguard::config::GuardConfig;
use routeguard::registry::{HandlerDefinition, HandlerGroup, PolicyRegistry};
use routeguard::security::{
    AuthorizationPolicy, HttpMetadataFetcher, MetadataError, MetadataFetcher, RejectReason,
};
use routeguard::{DenyReason, RouteGuard};
use std::time::Duration;

mod common;
use common::{discovery_json, hs256_jwk, jwks, make_hs256_jwt, MockProvider, AUDIENCE};

const SECRET: &[u8] = b"http-discovery-secret-0123456789";

fn fetcher(url: &str) -> HttpMetadataFetcher {
    HttpMetadataFetcher::new(url, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_fetches_discovery_document_and_keys() {
    let provider = MockProvider::serving(jwks(vec![hs256_jwk("k1", SECRET)]));
    let fetched = fetcher(&provider.discovery_url()).fetch().await.unwrap();

    assert_eq!(fetched.document.issuer, provider.base);
    assert_eq!(fetched.document.jwks_uri, format!("{}/keys", provider.base));
    assert_eq!(
        fetched.document.token_endpoint.as_deref(),
        Some(format!("{}/token", provider.base).as_str())
    );
    assert!(fetched.document.other.contains_key("response_types_supported"));
    assert_eq!(fetched.keys.kids().collect::<Vec<_>>(), vec!["k1"]);
    assert_eq!(provider.hits(), 2);
}

#[tokio::test]
async fn test_error_status_from_discovery() {
    let provider = MockProvider::start(|_, _| (500, r#"{"error":"boom"}"#.to_string()));
    let err = fetcher(&provider.discovery_url()).fetch().await.unwrap_err();
    assert!(matches!(err, MetadataError::Status { status: 500, .. }), "{err}");
}

#[tokio::test]
async fn test_invalid_discovery_json() {
    let provider = MockProvider::start(|_, _| (200, "<html>not json</html>".to_string()));
    let err = fetcher(&provider.discovery_url()).fetch().await.unwrap_err();
    assert!(matches!(err, MetadataError::Parse { .. }), "{err}");
}

#[tokio::test]
async fn test_discovery_without_jwks_uri() {
    let provider = MockProvider::start(|_, base| (200, format!(r#"{{"issuer":"{base}"}}"#)));
    let err = fetcher(&provider.discovery_url()).fetch().await.unwrap_err();
    assert!(matches!(err, MetadataError::Parse { .. }), "{err}");
}

#[tokio::test]
async fn test_insecure_jwks_uri_is_refused() {
    let provider = MockProvider::start(|path, base| match path {
        "/.well-known/openid-configuration" => {
            (200, discovery_json(base, "http://keys.attacker.example/jwks"))
        }
        _ => (404, "{}".to_string()),
    });
    let err = fetcher(&provider.discovery_url()).fetch().await.unwrap_err();
    match err {
        MetadataError::Parse { message, .. } => assert!(message.contains("jwks_uri"), "{message}"),
        other => panic!("expected parse error, got {other}"),
    }
    // the key set is never requested
    assert_eq!(provider.hits(), 1);
}

#[tokio::test]
async fn test_jwks_without_keys_array() {
    let provider = MockProvider::start(|path, base| match path {
        "/.well-known/openid-configuration" => (200, discovery_json(base, &format!("{base}/keys"))),
        _ => (200, r#"{"not_keys":[]}"#.to_string()),
    });
    let err = fetcher(&provider.discovery_url()).fetch().await.unwrap_err();
    match err {
        MetadataError::Parse { url, message } => {
            assert!(url.ends_with("/keys"));
            assert!(message.contains("keys"));
        }
        other => panic!("expected parse error, got {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_provider() {
    let err = fetcher("http://127.0.0.1:1/.well-known/openid-configuration")
        .fetch()
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::Fetch { .. }), "{err}");
}

#[tokio::test]
async fn test_guard_from_config_end_to_end() {
    let provider = MockProvider::serving(jwks(vec![hs256_jwk("k1", SECRET)]));
    let registry = PolicyRegistry::build(&vec![HandlerGroup::new("Orders")
        .authorize(AuthorizationPolicy::authenticated().with_scopes(["orders.read"]))
        .handler(HandlerDefinition::http("ListOrders", Some("orders")))])
    .unwrap();
    let config = GuardConfig::for_issuer(provider.base.clone(), AUDIENCE).unwrap();
    assert_eq!(config.discovery.url, provider.discovery_url());
    let guard = RouteGuard::from_config(&config, registry).unwrap();

    let token = make_hs256_jwt(SECRET, &provider.base, AUDIENCE, "k1", 300);
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    let decision = guard.authorize("ListOrders", &headers).await;
    assert!(decision.is_allowed(), "{decision:?}");

    // second request is answered from the cache
    assert!(guard.authorize("ListOrders", &headers).await.is_allowed());
    assert_eq!(provider.hits(), 2);

    let foreign = make_hs256_jwt(SECRET, "https://other-idp.example", AUDIENCE, "k1", 300);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {foreign}")).unwrap(),
    );
    assert_eq!(
        guard.authorize("ListOrders", &headers).await.deny_reason(),
        Some(DenyReason::Rejected(RejectReason::IssuerMismatch))
    );
}

#[tokio::test]
async fn test_guard_reports_unreachable_provider() {
    let registry = PolicyRegistry::build(&vec![HandlerGroup::new("Orders")
        .authorize(AuthorizationPolicy::authenticated())
        .handler(HandlerDefinition::http("ListOrders", None))])
    .unwrap();
    let config = GuardConfig::builder()
        .token_validation(routeguard::security::TokenValidationParameters::new(
            "http://127.0.0.1:1",
            AUDIENCE,
        ))
        .discovery_url("http://127.0.0.1:1/.well-known/openid-configuration")
        .fetch_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let guard = RouteGuard::from_config(&config, registry).unwrap();

    let token = make_hs256_jwt(SECRET, "http://127.0.0.1:1", AUDIENCE, "k1", 300);
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    let reason = guard.authorize("ListOrders", &headers).await.deny_reason().unwrap();
    assert_eq!(reason, DenyReason::Rejected(RejectReason::ProviderUnavailable));
    assert_eq!(reason.status_code().as_u16(), 503);
}
