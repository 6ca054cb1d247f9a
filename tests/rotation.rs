//! Integration tests for rotation coordination.
//!
//! These tests verify that the RotationCoordinator correctly:
//! - Persists a rotated refresh token before returning the access token
//! - Leaves the store untouched when the server did not rotate
//! - Applies the configured policy when persistence fails

use fortnox_extract::{
    CoordinatorError, Credentials, MemoryStore, PersistencePolicy, RefreshError,
    RefreshTokenStore, RotationCoordinator, Secret, TokenRefresher,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_credentials() -> Credentials {
    Credentials::new("test-client-id", "test-client-secret", "refresh-r1")
}

async fn setup_coordinator(
    server: &MockServer,
    response: ResponseTemplate,
) -> RotationCoordinator<MemoryStore> {
    Mock::given(method("POST"))
        .and(path("/oauth-v1/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(response)
        .mount(server)
        .await;

    let refresher = TokenRefresher::with_token_url(format!("{}/oauth-v1/token", server.uri()));
    let store = MemoryStore::with_token(Secret::new("refresh-r1"));
    RotationCoordinator::new(refresher, store)
}

fn rotated_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "access_token": "access-a1",
        "refresh_token": "refresh-r2",
        "expires_in": 3600
    }))
}

#[tokio::test]
async fn test_rotated_token_persisted_before_return() {
    let server = MockServer::start().await;
    let coordinator = setup_coordinator(&server, rotated_response()).await;

    let grant = coordinator
        .get_access_token(&test_credentials())
        .await
        .unwrap();

    // Caller holds the new access token; the store already holds the new
    // refresh token. A second exchange with the stale "refresh-r1" against
    // the real endpoint would fail with invalid_grant.
    assert_eq!(grant.token_pair.access_token.expose(), "access-a1");
    assert!(grant.rotated);
    assert!(grant.persist_warning.is_none());

    assert_eq!(coordinator.store().saved(), vec!["refresh-r2"]);
    assert_eq!(
        coordinator.store().load().await.unwrap().expose(),
        "refresh-r2"
    );
}

#[tokio::test]
async fn test_unrotated_token_not_persisted() {
    let server = MockServer::start().await;
    let coordinator = setup_coordinator(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "access-a1",
            "refresh_token": "refresh-r1",
            "expires_in": 3600
        })),
    )
    .await;

    let grant = coordinator
        .get_access_token(&test_credentials())
        .await
        .unwrap();

    assert!(!grant.rotated);
    assert!(coordinator.store().saved().is_empty());
}

#[tokio::test]
async fn test_absent_refresh_token_not_persisted() {
    let server = MockServer::start().await;
    let coordinator = setup_coordinator(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "access-a1"
        })),
    )
    .await;

    let grant = coordinator
        .get_access_token(&test_credentials())
        .await
        .unwrap();

    assert!(!grant.rotated);
    assert_eq!(grant.token_pair.refresh_token.expose(), "refresh-r1");
    assert!(coordinator.store().saved().is_empty());
}

#[tokio::test]
async fn test_persist_failure_warn_policy_returns_grant() {
    let server = MockServer::start().await;
    let coordinator = setup_coordinator(&server, rotated_response()).await;
    coordinator.store().fail_saves(true);

    let grant = coordinator
        .get_access_token(&test_credentials())
        .await
        .unwrap();

    // The access token is valid for this run; the warning is the signal
    // that the next run needs manual intervention.
    assert_eq!(grant.token_pair.access_token.expose(), "access-a1");
    assert!(grant.rotated);
    assert!(grant.persist_warning.is_some());
    assert!(coordinator.store().saved().is_empty());
}

#[tokio::test]
async fn test_persist_failure_fail_policy_errors_with_token() {
    let server = MockServer::start().await;
    let coordinator = setup_coordinator(&server, rotated_response())
        .await
        .with_policy(PersistencePolicy::Fail);
    coordinator.store().fail_saves(true);

    let result = coordinator.get_access_token(&test_credentials()).await;

    match result {
        Err(CoordinatorError::Persistence { access_token, .. }) => {
            assert_eq!(access_token.expose(), "access-a1");
        }
        other => panic!("expected CoordinatorError::Persistence, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_rejection_propagates_without_persisting() {
    let server = MockServer::start().await;
    let coordinator = setup_coordinator(
        &server,
        ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })),
    )
    .await;

    let result = coordinator.get_access_token(&test_credentials()).await;

    match result {
        Err(CoordinatorError::Refresh(RefreshError::Http { status, .. })) => {
            assert_eq!(status, 401);
        }
        other => panic!("expected CoordinatorError::Refresh, got {other:?}"),
    }
    assert!(coordinator.store().saved().is_empty());
    // The stored token was never touched.
    assert_eq!(
        coordinator.store().load().await.unwrap().expose(),
        "refresh-r1"
    );
}

#[tokio::test]
async fn test_repeated_calls_persist_each_rotation_once() {
    let server = MockServer::start().await;
    let coordinator = setup_coordinator(&server, rotated_response()).await;

    let creds = test_credentials();
    let grant = coordinator.get_access_token(&creds).await.unwrap();

    // Next run carries the rotated token; the server keeps answering with
    // "refresh-r2", so no further save happens.
    let creds = creds.with_refresh_token(grant.token_pair.refresh_token.clone());
    let second = coordinator.get_access_token(&creds).await.unwrap();

    assert!(!second.rotated);
    assert_eq!(coordinator.store().saved(), vec!["refresh-r2"]);
}
