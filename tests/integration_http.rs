//! HTTP API integration tests
//!
//! Drives the router end to end:
//! - Registration, verification, login, password change and logout
//! - Rate-limit and lockout responses with their headers
//! - Admin Basic authentication and event queries
//! - A real listener with peer address attribution

mod common;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use base64::Engine;
use common::*;
use marketplace_auth::config::{MonitoringConfig, RateLimitRule, RateLimitsConfig};
use marketplace_auth::models::{EventFilter, SecurityEventType};
use marketplace_auth::server::build_router;
use serde_json::{json, Value};

fn bearer(token: &str) -> HeaderValue {
    format!("Bearer {}", token).parse().unwrap()
}

fn admin_basic(password: &str) -> HeaderValue {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("admin:{}", password))
    )
    .parse()
    .unwrap()
}

fn forwarded(ip: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_str(ip).unwrap(),
    )
}

/// Test 1: Complete account flow over HTTP
#[tokio::test]
async fn test_http_account_flow() {
    let ctx = create_test_context().await;
    let server = TestServer::new(build_router(ctx.state())).unwrap();

    let response = server
        .post("/register")
        .json(&json!({
            "email": "flow@example.com",
            "password": GOOD_PASSWORD,
            "displayName": "Flow Seller"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    // Unverified accounts cannot sign in
    let response = server
        .post("/login")
        .json(&json!({ "email": "flow@example.com", "password": GOOD_PASSWORD }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["kind"], "email_not_verified");

    let token = extract_token(&ctx.notifier.sent_to("flow@example.com")[0].body);
    let response = server
        .get("/verify-email")
        .add_query_param("token", &token)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["emailVerified"], true);

    let response = server
        .post("/login")
        .json(&json!({ "email": "flow@example.com", "password": GOOD_PASSWORD }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let session = body["session"]["token"].as_str().unwrap().to_string();
    assert!(body["session"]["expiresAt"].is_string());

    let response = server
        .get("/session")
        .add_header(header::AUTHORIZATION, bearer(&session))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["email"], "flow@example.com");

    let response = server
        .post("/password/change")
        .add_header(header::AUTHORIZATION, bearer(&session))
        .json(&json!({
            "currentPassword": GOOD_PASSWORD,
            "newPassword": "Changed-Pass-42",
            "confirmPassword": "Changed-Pass-42"
        }))
        .await;
    response.assert_status_ok();

    let response = server
        .post("/logout")
        .add_header(header::AUTHORIZATION, bearer(&session))
        .await;
    response.assert_status_ok();

    let response = server
        .get("/session")
        .add_header(header::AUTHORIZATION, bearer(&session))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/login")
        .json(&json!({ "email": "flow@example.com", "password": "Changed-Pass-42" }))
        .await;
    response.assert_status_ok();
}

/// Test 2: Password reset completes over HTTP
#[tokio::test]
async fn test_http_password_reset() {
    let ctx = create_test_context().await;
    register_verified(&ctx, "forgot@example.com").await;
    let server = TestServer::new(build_router(ctx.state())).unwrap();

    let response = server
        .post("/password-reset")
        .json(&json!({ "email": "forgot@example.com" }))
        .await;
    response.assert_status_ok();
    let token = extract_token(&ctx.notifier.sent_to("forgot@example.com").pop().unwrap().body);

    let response = server
        .put("/password-reset")
        .json(&json!({
            "token": token,
            "newPassword": "Reset-Pass-2024",
            "confirmPassword": "Different-Pass-2024"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["field"], "confirmPassword");

    let response = server
        .put("/password-reset")
        .json(&json!({
            "token": token,
            "newPassword": "Reset-Pass-2024",
            "confirmPassword": "Reset-Pass-2024"
        }))
        .await;
    response.assert_status_ok();

    let response = server
        .put("/password-reset")
        .json(&json!({
            "token": token,
            "newPassword": "Reset-Pass-2025",
            "confirmPassword": "Reset-Pass-2025"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["kind"], "token_invalid");
}

/// Test 3: Rate-limited logins return 429 with rate-limit headers
#[tokio::test]
async fn test_http_login_rate_limit_headers() {
    let limits = RateLimitsConfig {
        login_ip: RateLimitRule::new(2, 900),
        ..Default::default()
    };
    let ctx = create_test_context_with(
        create_test_auth_config(),
        limits,
        MonitoringConfig::default(),
    )
    .await;
    let server = TestServer::new(build_router(ctx.state())).unwrap();

    for _ in 0..2 {
        let (name, value) = forwarded("203.0.113.77");
        let response = server
            .post("/login")
            .add_header(name, value)
            .json(&json!({ "email": "ghost@example.com", "password": "Whatever-123" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    let (name, value) = forwarded("203.0.113.77");
    let response = server
        .post("/login")
        .add_header(name, value)
        .json(&json!({ "email": "ghost@example.com", "password": "Whatever-123" }))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);

    let headers = response.headers();
    assert!(headers.contains_key(header::RETRY_AFTER));
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert!(headers.contains_key("x-ratelimit-reset"));

    let body: Value = response.json();
    assert_eq!(body["error"]["kind"], "rate_limit_exceeded");
    assert!(body["error"]["retryAfterSecs"].as_u64().unwrap() > 0);

    // Another origin is unaffected
    let (name, value) = forwarded("203.0.113.78");
    let response = server
        .post("/login")
        .add_header(name, value)
        .json(&json!({ "email": "ghost@example.com", "password": "Whatever-123" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

/// Test 4: Locked accounts return 423 with Retry-After
#[tokio::test]
async fn test_http_lockout_response() {
    let ctx = create_test_context().await;
    register_verified(&ctx, "lock@example.com").await;
    let server = TestServer::new(build_router(ctx.state())).unwrap();

    for _ in 0..5 {
        let response = server
            .post("/login")
            .json(&json!({ "email": "lock@example.com", "password": "Wrong-Password-1" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    let response = server
        .post("/login")
        .json(&json!({ "email": "lock@example.com", "password": GOOD_PASSWORD }))
        .await;
    response.assert_status(StatusCode::LOCKED);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body: Value = response.json();
    assert_eq!(body["error"]["kind"], "account_locked");
}

/// Test 5: Admin endpoints query events and unlock accounts
#[tokio::test]
async fn test_http_admin_endpoints() {
    let ctx = create_test_context().await;
    let profile = register_verified(&ctx, "admin-target@example.com").await;
    let server = TestServer::new(build_router(ctx.state())).unwrap();

    for _ in 0..5 {
        let (name, value) = forwarded("198.51.100.200");
        server
            .post("/login")
            .add_header(name, value)
            .json(&json!({ "email": "admin-target@example.com", "password": "Wrong-Password-1" }))
            .await;
    }

    let response = server
        .get("/security/events")
        .add_header(header::AUTHORIZATION, admin_basic("not-the-password"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let response = server
        .get("/security/events")
        .add_query_param("type", "LOGIN_ATTEMPT")
        .add_query_param("ip", "198.51.100.200")
        .add_query_param("success", "false")
        .add_header(header::AUTHORIZATION, admin_basic(ADMIN_PASSWORD))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], 5);
    assert_eq!(body["events"][0]["eventType"], "LOGIN_ATTEMPT");
    assert_eq!(body["events"][0]["ipAddress"], "198.51.100.200");

    let response = server
        .post(&format!("/security/accounts/{}/unlock", profile.id))
        .add_header(header::AUTHORIZATION, admin_basic(ADMIN_PASSWORD))
        .await;
    response.assert_status_ok();

    let response = server
        .post("/login")
        .json(&json!({ "email": "admin-target@example.com", "password": GOOD_PASSWORD }))
        .await;
    response.assert_status_ok();
}

/// Test 6: Real listener attributes events to the peer address
#[tokio::test]
async fn test_real_listener_peer_address() {
    let ctx = create_test_context().await;
    let (addr, shutdown_tx) = run_test_server(ctx.state()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let response = client
        .post(format!("http://{}/login", addr))
        .json(&json!({ "email": "ghost@example.com", "password": "Whatever-123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    let events = ctx
        .auth
        .audit()
        .query(&EventFilter::new().with_type(SecurityEventType::LoginAttempt))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].ip_address.as_deref(), Some("127.0.0.1"));

    let _ = shutdown_tx.send(());
}

/// Test 7: Allowed requests report the remaining quota
#[tokio::test]
async fn test_http_quota_headers_on_success() {
    let ctx = create_test_context().await;
    register_verified(&ctx, "quota@example.com").await;
    let server = TestServer::new(build_router(ctx.state())).unwrap();

    let (name, value) = forwarded("203.0.113.90");
    let response = server
        .post("/login")
        .add_header(name, value)
        .json(&json!({ "email": "quota@example.com", "password": GOOD_PASSWORD }))
        .await;
    response.assert_status_ok();

    // The per-account rule (10 per window) is tighter than the per-address one
    let headers = response.headers();
    assert_eq!(headers["x-ratelimit-limit"], "10");
    assert_eq!(headers["x-ratelimit-remaining"], "9");
    assert!(headers.contains_key("x-ratelimit-reset"));

    let response = server.get("/health").await;
    response.assert_status_ok();
    assert!(!response.headers().contains_key("x-ratelimit-limit"));
}
