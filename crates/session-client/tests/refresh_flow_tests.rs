//! Refresh and mutation flows against a mocked gateway

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use syncgate_auth_core::IdentityFields;
use syncgate_session_client::{
    ClientConfig, ClientError, CredentialStore, HttpRefresher, InvalidationHint, MutationClient,
    RefreshCoordinator, SessionCache, SessionClient, TokenProvider,
};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn identity_cookies(jwt: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .append_header("set-cookie", "userid=u1; Path=/; Max-Age=31536000")
        .append_header("set-cookie", "email=a%40b.com; Path=/; Max-Age=31536000")
        .append_header("set-cookie", format!("jwt={}; Path=/; Max-Age=31536000", jwt).as_str())
}

fn logged_in_store() -> CredentialStore {
    CredentialStore::with_fields(IdentityFields::new("u1", "a@b.com", "old-token"))
}

fn coordinator(server: &MockServer, store: &CredentialStore) -> Arc<RefreshCoordinator> {
    let refresher = HttpRefresher::new(&ClientConfig::new(server.uri()), store.clone()).unwrap();
    Arc::new(RefreshCoordinator::new(Arc::new(refresher), store.clone()))
}

#[tokio::test]
async fn test_refresh_updates_session_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .and(header_exists("cookie"))
        .respond_with(identity_cookies("new-token"))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let session = SessionCache::new(store.clone());
    let tokens = coordinator(&server, &store);

    assert_eq!(session.read().unwrap().raw_token, "old-token");

    let token = tokens.get_token(Some(InvalidationHint::InvalidToken)).await;
    assert_eq!(token.as_deref(), Some("new-token"));

    let identity = session.read().unwrap();
    assert_eq!(identity.raw_token, "new-token");
    assert_eq!(identity.email, "a@b.com");
}

#[tokio::test]
async fn test_concurrent_invalidations_make_one_refresh_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(identity_cookies("new-token").set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let tokens = coordinator(&server, &store);

    let callers = (0..10).map(|_| {
        let tokens = tokens.clone();
        async move { tokens.get_token(Some(InvalidationHint::InvalidToken)).await }
    });
    let results = futures::future::join_all(callers).await;

    assert!(results.iter().all(|t| t.as_deref() == Some("new-token")));
    assert_eq!(tokens.refresh_count(), 1);
}

#[tokio::test]
async fn test_rejected_refresh_returns_none_and_keeps_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let tokens = coordinator(&server, &store);

    assert!(tokens.get_token(Some(InvalidationHint::InvalidToken)).await.is_none());
    assert_eq!(store.token().as_deref(), Some("old-token"));
}

#[tokio::test]
async fn test_mutation_retried_once_after_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mutations"))
        .and(header("authorization", "Bearer old-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid token" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mutations"))
        .and(header("authorization", "Bearer new-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "mutations": [{ "id": 1 }] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(identity_cookies("new-token"))
        .expect(1)
        .mount(&server)
        .await;

    let client = SessionClient::new(&ClientConfig::new(server.uri()), logged_in_store()).unwrap();
    let result = client.mutations.push(r#"{"mutations":[]}"#).await.unwrap();

    assert_eq!(result, json!({ "mutations": [{ "id": 1 }] }));
    assert_eq!(client.session.read().unwrap().raw_token, "new-token");
}

#[tokio::test]
async fn test_mutation_after_failed_refresh_is_logged_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mutations"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid token" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let tokens = coordinator(&server, &store);
    let client = MutationClient::new(&ClientConfig::new(server.uri()), tokens).unwrap();

    let err = client.push("{}").await.unwrap_err();
    assert!(matches!(err, ClientError::LoggedOut));
}

#[tokio::test]
async fn test_business_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mutations"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "error": "cart is full" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(identity_cookies("new-token"))
        .expect(0)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let tokens = coordinator(&server, &store);
    let client = MutationClient::new(&ClientConfig::new(server.uri()), tokens).unwrap();

    match client.push("{}").await.unwrap_err() {
        ClientError::MutationRejected { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "cart is full");
        }
        other => panic!("Expected MutationRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_rejection_is_returned_without_another_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mutations"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid token" })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(identity_cookies("new-token"))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let tokens = coordinator(&server, &store);
    let client = MutationClient::new(&ClientConfig::new(server.uri()), tokens.clone()).unwrap();

    match client.push("{}").await.unwrap_err() {
        ClientError::Unauthorized { message } => assert_eq!(message, "Invalid token"),
        other => panic!("Expected Unauthorized, got {:?}", other),
    }
    assert_eq!(tokens.refresh_count(), 1);
}

#[tokio::test]
async fn test_refresh_without_identity_cookies_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let tokens = coordinator(&server, &store);

    assert!(tokens.get_token(Some(InvalidationHint::InvalidToken)).await.is_none());
    assert_eq!(store.token().as_deref(), Some("old-token"));
}

#[tokio::test]
async fn test_abandoned_refresh_completes_in_background() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(identity_cookies("fresh").set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let store = logged_in_store();
    let config = ClientConfig {
        request_timeout_ms: 300,
        ..ClientConfig::new(server.uri())
    };
    let refresher = HttpRefresher::new(&config, store.clone()).unwrap();
    let tokens = Arc::new(RefreshCoordinator::new(Arc::new(refresher), store.clone()));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        tokens.get_token(Some(InvalidationHint::InvalidToken)),
    )
    .await;
    assert!(abandoned.is_err());

    // Well past the client timeout: a refresh left parked would now fail.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!tokens.is_refreshing());
    assert_eq!(store.token().as_deref(), Some("fresh"));

    let token = tokens.get_token(Some(InvalidationHint::InvalidToken)).await;
    assert_eq!(token.as_deref(), Some("fresh"));
    assert_eq!(tokens.refresh_count(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
