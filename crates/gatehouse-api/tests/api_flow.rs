//! # Integration Tests for gatehouse-api
//!
//! Drives the assembled router end to end: admission, CORS, login, bearer
//! authentication, refresh rotation, logout, registration, and role gates.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode};
use gatehouse_api::gate::{NewUser, TokenPair};
use gatehouse_api::routes::users::UserProfile;
use gatehouse_api::state::AppState;
use gatehouse_api::store::InMemoryUserStore;
use gatehouse_core::Settings;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use zeroize::Zeroizing;

const HOST: &str = "localhost:8000";

fn settings(extra: &[(&str, &str)]) -> Settings {
    let mut vars = vec![
        ("ENVIRONMENT", "TEST"),
        ("BACKEND_CORS_ORIGINS", r#"["http://localhost:3000"]"#),
        ("SECURITY_HASH_MEMORY_KIB", "64"),
        ("SECURITY_HASH_ITERATIONS", "1"),
        ("LOGIN_RATE_LIMIT_MAX", "5"),
    ];
    vars.extend_from_slice(extra);
    Settings::from_vars(vars).unwrap()
}

/// Helper: build the test app and keep a handle on its state and store.
fn test_app_with(extra: &[(&str, &str)]) -> (axum::Router, AppState, InMemoryUserStore) {
    let store = InMemoryUserStore::new();
    let state = AppState::with_store(settings(extra), Arc::new(store.clone())).unwrap();
    (gatehouse_api::app(state.clone()), state, store)
}

fn test_app() -> (axum::Router, AppState, InMemoryUserStore) {
    test_app_with(&[])
}

/// Helper: read response body as string.
async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", HOST)
        .body(Body::empty())
        .unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", HOST)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", HOST)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Helper: a failing login attempt arriving from TCP peer `peer`.
fn login_attempt(peer: [u8; 4], forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/login/access-token")
        .header("host", HOST)
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from((peer, 40_000))));
    if let Some(value) = forwarded_for {
        builder = builder.header("x-forwarded-for", value);
    }
    builder
        .body(Body::from(json!({"username": "x", "password": "y"}).to_string()))
        .unwrap()
}

async fn seed_user(state: &AppState, username: &str, password: &str, superuser: bool) -> UserProfile {
    state
        .gate
        .register(NewUser {
            identifier: username.into(),
            password: Zeroizing::new(password.into()),
            full_name: None,
            is_superuser: superuser,
        })
        .await
        .unwrap()
        .into()
}

async fn login(app: &axum::Router, username: &str, password: &str) -> TokenPair {
    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/v1/login/access-token",
            json!({"username": username, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_str(&body_string(response).await).unwrap()
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn test_liveness_probe() {
    let (app, _, _) = test_app();
    let response = app.oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_probe() {
    let (app, _, _) = test_app();
    let response = app.oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ready");
}

// -- Admission ----------------------------------------------------------------

#[tokio::test]
async fn test_foreign_origin_is_rejected_before_routing() {
    let (app, _, _) = test_app();
    let request = Request::builder()
        .uri("/health/liveness")
        .header("host", HOST)
        .header("origin", "http://evil.test")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "ORIGIN_NOT_ALLOWED");
}

#[tokio::test]
async fn test_allowed_origin_gets_cors_headers() {
    let (app, _, _) = test_app();
    let request = Request::builder()
        .uri("/health/liveness")
        .header("host", HOST)
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:3000"
    );
}

#[tokio::test]
async fn test_cors_preflight_from_allowed_origin() {
    let (app, _, _) = test_app();
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/login/access-token")
        .header("host", HOST)
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:3000"
    );
}

#[tokio::test]
async fn test_unknown_host_is_rejected() {
    let (app, _, _) = test_app();
    let request = Request::builder()
        .uri("/health/liveness")
        .header("host", "evil.test")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "HOST_NOT_ALLOWED");
}

// -- Login ------------------------------------------------------------------

#[tokio::test]
async fn test_login_then_read_profile() {
    let (app, state, _) = test_app();
    let seeded = seed_user(&state, "alice@example.com", "correct-horse", false).await;

    let pair = login(&app, "Alice@Example.com", "correct-horse").await;
    assert_eq!(pair.token_type, "bearer");

    let response = app
        .oneshot(get_with_token("/v1/users/me", &pair.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let profile: UserProfile = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(profile, seeded);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let (app, state, _) = test_app();
    seed_user(&state, "alice@example.com", "correct-horse", false).await;

    let mut bodies = Vec::new();
    for (user, pass) in [
        ("alice@example.com", "wrong-horse"),
        ("nobody@example.com", "correct-horse"),
    ] {
        let response = app
            .clone()
            .oneshot(send_json(
                "POST",
                "/v1/login/access-token",
                json!({"username": user, "password": pass}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get("www-authenticate").unwrap(), "Bearer");
        bodies.push(body_string(response).await);
    }
    assert_eq!(bodies[0], bodies[1]);
    assert!(bodies[0].contains("AUTHENTICATION_FAILED"));
}

#[tokio::test]
async fn test_malformed_login_body_is_bad_request() {
    let (app, _, _) = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/login/access-token")
        .header("host", HOST)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_is_rate_limited() {
    let (app, _, _) = test_app_with(&[("LOGIN_RATE_LIMIT_MAX", "2")]);
    for _ in 0..2 {
        let response = app.clone().oneshot(login_attempt([203, 0, 113, 9], None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.clone().oneshot(login_attempt([203, 0, 113, 9], None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different peer has its own budget.
    let response = app.clone().oneshot(login_attempt([203, 0, 113, 10], None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Other endpoints are unaffected.
    let response = app.oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_spoofed_forwarded_for_is_still_rate_limited() {
    let (app, _, _) = test_app_with(&[("LOGIN_RATE_LIMIT_MAX", "3")]);
    let mut statuses = Vec::new();
    for i in 0..10u8 {
        let spoofed = format!("198.51.100.{i}");
        let response = app
            .clone()
            .oneshot(login_attempt([203, 0, 113, 9], Some(&spoofed)))
            .await
            .unwrap();
        statuses.push(response.status());
    }
    assert!(statuses[..3].iter().all(|s| *s == StatusCode::UNAUTHORIZED), "{statuses:?}");
    assert!(statuses[3..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS), "{statuses:?}");
}

#[tokio::test]
async fn test_trusted_proxy_forwards_client_address() {
    let (app, _, _) = test_app_with(&[
        ("LOGIN_RATE_LIMIT_MAX", "1"),
        ("TRUSTED_PROXIES", r#"["10.0.0.1"]"#),
    ]);
    let proxy = [10, 0, 0, 1];
    let first = app.clone().oneshot(login_attempt(proxy, Some("198.51.100.1"))).await.unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    let again = app.clone().oneshot(login_attempt(proxy, Some("198.51.100.1"))).await.unwrap();
    assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    let other_client = app.oneshot(login_attempt(proxy, Some("198.51.100.2"))).await.unwrap();
    assert_eq!(other_client.status(), StatusCode::UNAUTHORIZED);
}

// -- Bearer authentication ----------------------------------------------------

#[tokio::test]
async fn test_protected_route_requires_token() {
    let (app, _, _) = test_app();
    let response = app.oneshot(get("/v1/users/me")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get("www-authenticate").unwrap(), "Bearer");
}

#[tokio::test]
async fn test_tampered_token_is_invalid() {
    let (app, state, _) = test_app();
    seed_user(&state, "alice@example.com", "correct-horse", false).await;
    let pair = login(&app, "alice@example.com", "correct-horse").await;

    let mut tampered = pair.access_token.clone();
    tampered.pop();
    tampered.push(if pair.access_token.ends_with('A') { 'B' } else { 'A' });

    let response = app
        .oneshot(get_with_token("/v1/users/me", &tampered))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_refresh_token_cannot_be_used_as_access_token() {
    let (app, state, _) = test_app();
    seed_user(&state, "alice@example.com", "correct-horse", false).await;
    let pair = login(&app, "alice@example.com", "correct-horse").await;

    let response = app
        .oneshot(get_with_token("/v1/users/me", &pair.refresh_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_path_is_not_found_without_auth_challenge() {
    let (app, _, _) = test_app();
    let response = app.oneshot(get("/v1/nowhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Refresh & logout ---------------------------------------------------------

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let (app, state, _) = test_app();
    seed_user(&state, "alice@example.com", "correct-horse", false).await;
    let pair = login(&app, "alice@example.com", "correct-horse").await;

    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/v1/login/refresh",
            json!({"refresh_token": pair.refresh_token}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated: TokenPair = serde_json::from_str(&body_string(response).await).unwrap();
    assert_ne!(rotated.refresh_token, pair.refresh_token);

    let reuse = app
        .oneshot(send_json(
            "POST",
            "/v1/login/refresh",
            json!({"refresh_token": pair.refresh_token}),
        ))
        .await
        .unwrap();
    assert_eq!(reuse.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let (app, state, _) = test_app();
    seed_user(&state, "alice@example.com", "correct-horse", false).await;
    let pair = login(&app, "alice@example.com", "correct-horse").await;

    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/v1/logout",
            json!({"refresh_token": pair.refresh_token}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(send_json(
            "POST",
            "/v1/login/refresh",
            json!({"refresh_token": pair.refresh_token}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// -- Registration & accounts --------------------------------------------------

#[tokio::test]
async fn test_open_registration_creates_account() {
    let (app, _, store) = test_app();
    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/v1/users",
            json!({"username": "Bob@Example.com", "password": "long-enough", "full_name": "Bob"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["username"], "bob@example.com");
    assert!(body.get("digest").is_none());
    assert_eq!(store.len(), 1);

    let duplicate = app
        .oneshot(send_json(
            "POST",
            "/v1/users",
            json!({"username": "bob@example.com", "password": "long-enough"}),
        ))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_registration_rejects_short_password() {
    let (app, _, store) = test_app();
    let response = app
        .oneshot(send_json(
            "POST",
            "/v1/users",
            json!({"username": "bob@example.com", "password": "short"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_closed_registration_is_forbidden() {
    let (app, _, _) = test_app_with(&[("USERS_OPEN_REGISTRATION", "false")]);
    let response = app
        .oneshot(send_json(
            "POST",
            "/v1/users",
            json!({"username": "bob@example.com", "password": "long-enough"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_change_password_flow() {
    let (app, state, _) = test_app();
    seed_user(&state, "alice@example.com", "correct-horse", false).await;
    let pair = login(&app, "alice@example.com", "correct-horse").await;

    let change = |original: &str, password: &str| {
        Request::builder()
            .method("PUT")
            .uri("/v1/users/me/password")
            .header("host", HOST)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", pair.access_token))
            .body(Body::from(
                json!({"original": original, "password": password}).to_string(),
            ))
            .unwrap()
    };

    let wrong = app.clone().oneshot(change("nope-nope", "battery-staple")).await.unwrap();
    assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);

    let ok = app.clone().oneshot(change("correct-horse", "battery-staple")).await.unwrap();
    assert_eq!(ok.status(), StatusCode::NO_CONTENT);

    login(&app, "alice@example.com", "battery-staple").await;
}

#[tokio::test]
async fn test_reading_other_accounts_requires_superuser() {
    let (app, state, _) = test_app();
    let alice = seed_user(&state, "alice@example.com", "correct-horse", false).await;
    let bob = seed_user(&state, "bob@example.com", "battery-staple", false).await;
    seed_user(&state, "admin@example.com", "admin-password", true).await;

    let alice_pair = login(&app, "alice@example.com", "correct-horse").await;
    let admin_pair = login(&app, "admin@example.com", "admin-password").await;

    let own = app
        .clone()
        .oneshot(get_with_token(&format!("/v1/users/{}", alice.id), &alice_pair.access_token))
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);

    let other = app
        .clone()
        .oneshot(get_with_token(&format!("/v1/users/{}", bob.id), &alice_pair.access_token))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::FORBIDDEN);

    let as_admin = app
        .oneshot(get_with_token(&format!("/v1/users/{}", bob.id), &admin_pair.access_token))
        .await
        .unwrap();
    assert_eq!(as_admin.status(), StatusCode::OK);
    let profile: UserProfile = serde_json::from_str(&body_string(as_admin).await).unwrap();
    assert_eq!(profile.id, bob.id);
}

#[tokio::test]
async fn test_deactivated_account_cannot_read_profile() {
    let (app, state, store) = test_app();
    let alice = seed_user(&state, "alice@example.com", "correct-horse", false).await;
    let pair = login(&app, "alice@example.com", "correct-horse").await;
    store.set_active(alice.id, false).unwrap();

    let response = app
        .clone()
        .oneshot(get_with_token("/v1/users/me", &pair.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let by_id = app
        .oneshot(get_with_token(&format!("/v1/users/{}", alice.id), &pair.access_token))
        .await
        .unwrap();
    assert_eq!(by_id.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deactivated_superuser_cannot_read_other_accounts() {
    let (app, state, store) = test_app();
    let bob = seed_user(&state, "bob@example.com", "battery-staple", false).await;
    let admin = seed_user(&state, "admin@example.com", "admin-password", true).await;
    let pair = login(&app, "admin@example.com", "admin-password").await;
    store.set_active(admin.id, false).unwrap();

    let response = app
        .oneshot(get_with_token(&format!("/v1/users/{}", bob.id), &pair.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
