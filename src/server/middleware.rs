//! HTTP middleware and extractors for marketplace-auth
//!
//! This module provides:
//! - Client context extraction (origin address, user agent)
//! - Bearer session token and admin Basic credential extractors
//! - Mapping of [`AuthError`] onto HTTP responses
//! - Rate-limit headers on every rate-limited response
//! - Request logging

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::auth::ratelimit::track_quota;
use crate::database::Database;
use crate::error::{AuthError, ErrorKind, MonitorError};
use crate::models::ClientContext;

use super::router::AppState;

/// Header carrying the original client address behind a proxy
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

// =============================================================================
// Error responses
// =============================================================================

/// An [`AuthError`] on its way to becoming an HTTP response
#[derive(Debug)]
pub struct ApiError {
    error: AuthError,
    challenge: bool,
}

impl ApiError {
    /// Error for an admin endpoint; 401s carry a Basic challenge
    pub fn admin(error: AuthError) -> Self {
        Self {
            error,
            challenge: true,
        }
    }

    pub fn error(&self) -> &AuthError {
        &self.error
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        Self {
            error,
            challenge: false,
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(error: MonitorError) -> Self {
        let error = match error {
            MonitorError::AlertNotFound(id) => AuthError::NotFound(format!("Alert {}", id)),
            MonitorError::InvalidThreshold(reason) => {
                AuthError::validation("threshold", vec![reason])
            }
            MonitorError::Storage(e) => AuthError::from(e),
        };
        Self::from(error)
    }
}

/// HTTP status for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::TokenInvalid | ErrorKind::TokenExpired => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::InvalidCredentials
        | ErrorKind::SessionExpired
        | ErrorKind::SessionNotFound
        | ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::EmailNotVerified => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::EmailAlreadyRegistered => StatusCode::CONFLICT,
        ErrorKind::AccountLocked => StatusCode::LOCKED,
        ErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        let status = status_for(kind);

        let message = match &self.error {
            AuthError::ServiceUnavailable(reason) => {
                tracing::error!(reason = %reason, "Request failed on a downstream dependency");
                "Service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({ "kind": kind, "message": message });
        let mut headers = HeaderMap::new();

        match &self.error {
            AuthError::Validation { field, errors } => {
                body["field"] = json!(field);
                body["errors"] = json!(errors);
            }
            AuthError::AccountLocked { retry_after_secs } => {
                body["retryAfterSecs"] = json!(retry_after_secs);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            AuthError::RateLimitExceeded {
                limit,
                retry_after_secs,
                reset_at,
            } => {
                body["retryAfterSecs"] = json!(retry_after_secs);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
                insert_rate_limit_headers(&mut headers, *limit, 0, *reset_at);
            }
            _ => {}
        }

        if self.challenge && status == StatusCode::UNAUTHORIZED {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"marketplace-admin\""),
            );
        }

        (status, headers, Json(json!({ "error": body }))).into_response()
    }
}

fn insert_rate_limit_headers(
    headers: &mut HeaderMap,
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at.timestamp()));
}

/// Report the quota left after any rate-limited operation in the request
pub async fn rate_limit_headers(request: Request, next: Next) -> Response {
    let (mut response, decision) = track_quota(next.run(request)).await;

    if let Some(decision) = decision {
        let headers = response.headers_mut();
        if !headers.contains_key("x-ratelimit-limit") {
            insert_rate_limit_headers(
                headers,
                decision.limit,
                decision.remaining,
                decision.reset_at,
            );
        }
    }
    response
}

// =============================================================================
// Extractors
// =============================================================================

/// Build the client context from request headers and the peer address
///
/// The first `X-Forwarded-For` entry is used only when `trust_forwarded_for`
/// is set.
pub fn client_context(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> ClientContext {
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get(FORWARDED_FOR_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .flatten();

    let mut context = ClientContext::new();
    if let Some(ip) = forwarded.or_else(|| peer.map(|addr| addr.ip().to_string())) {
        context = context.with_ip(ip);
    }
    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        context = context.with_user_agent(agent);
    }
    context
}

/// Request metadata of the calling client
#[derive(Debug, Clone)]
pub struct ClientInfo(pub ClientContext);

#[async_trait]
impl<D: Database + 'static> FromRequestParts<AppState<D>> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<D>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientInfo(client_context(
            &parts.headers,
            peer,
            state.trust_forwarded_for,
        )))
    }
}

/// Bearer session token from the Authorization header
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| SessionToken(token.trim().to_string()))
            .filter(|SessionToken(token)| !token.is_empty())
            .ok_or_else(|| ApiError::from(AuthError::SessionNotFound))
    }
}

/// Decode `Basic` credentials into username and password
pub fn parse_basic_credentials(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// An authenticated administrator
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub username: String,
    pub context: ClientContext,
}

#[async_trait]
impl<D: Database + 'static> FromRequestParts<AppState<D>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<D>,
    ) -> Result<Self, Self::Rejection> {
        let ClientInfo(context) = match ClientInfo::from_request_parts(parts, state).await {
            Ok(info) => info,
            Err(never) => match never {},
        };

        let (username, password) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_basic_credentials)
            .ok_or_else(|| ApiError::admin(AuthError::Unauthorized))?;

        state
            .auth
            .verify_admin(&username, &password, &context)
            .await
            .map_err(ApiError::admin)?;

        Ok(AdminUser { username, context })
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging middleware function
///
/// Logs method, path, status code and response time. Query strings are
/// omitted since they may carry single-use tokens.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // Test 1: Status mapping follows the error kind
    #[test]
    fn test_status_for() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::TokenExpired), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::EmailNotVerified), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::EmailAlreadyRegistered), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::AccountLocked), StatusCode::LOCKED);
        assert_eq!(
            status_for(ErrorKind::RateLimitExceeded),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(ErrorKind::ServiceUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    // Test 2: Rate-limit responses carry the limit headers
    #[tokio::test]
    async fn test_rate_limit_response_headers() {
        let reset_at = Utc::now() + chrono::Duration::seconds(30);
        let response = ApiError::from(AuthError::RateLimitExceeded {
            limit: 3,
            retry_after_secs: 30,
            reset_at,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["x-ratelimit-limit"], "3");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(
            headers["x-ratelimit-reset"],
            reset_at.timestamp().to_string().as_str()
        );
        assert_eq!(headers[header::RETRY_AFTER], "30");

        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "rate_limit_exceeded");
        assert_eq!(body["error"]["retryAfterSecs"], 30);
    }

    // Test 3: Validation errors list the field errors
    #[tokio::test]
    async fn test_validation_response_body() {
        let response = ApiError::from(AuthError::validation(
            "password",
            vec!["too short".to_string(), "needs a number".to_string()],
        ))
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["field"], "password");
        assert_eq!(body["error"]["errors"].as_array().unwrap().len(), 2);
    }

    // Test 4: Downstream failures are not disclosed
    #[tokio::test]
    async fn test_service_unavailable_hides_reason() {
        let response =
            ApiError::from(AuthError::ServiceUnavailable("disk I/O error".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Service temporarily unavailable");
    }

    // Test 5: Admin 401 carries a Basic challenge
    #[test]
    fn test_admin_challenge() {
        let response = ApiError::admin(AuthError::Unauthorized).into_response();
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = ApiError::from(AuthError::Unauthorized).into_response();
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    // Test 6: Forwarded-for is honoured only when trusted
    #[test]
    fn test_client_context_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();

        let trusted = client_context(&headers, Some(peer), true);
        assert_eq!(trusted.ip_address.as_deref(), Some("203.0.113.5"));
        assert_eq!(trusted.user_agent.as_deref(), Some("curl/8.0"));

        let untrusted = client_context(&headers, Some(peer), false);
        assert_eq!(untrusted.ip_address.as_deref(), Some("10.0.0.1"));

        let none = client_context(&HeaderMap::new(), None, true);
        assert!(none.ip_address.is_none());
    }

    // Test 7: Basic credential parsing
    #[test]
    fn test_parse_basic_credentials() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("admin:pa:ss");
        assert_eq!(
            parse_basic_credentials(&format!("Basic {}", encoded)),
            Some(("admin".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(parse_basic_credentials("Bearer abc"), None);
        assert_eq!(parse_basic_credentials("Basic !!!"), None);
    }

    // Test 8: Monitor errors map onto service errors
    #[test]
    fn test_monitor_error_mapping() {
        let err = ApiError::from(MonitorError::AlertNotFound("a1".into()));
        assert_eq!(err.error(), &AuthError::NotFound("Alert a1".to_string()));

        let err = ApiError::from(MonitorError::InvalidThreshold("bad".into()));
        assert_eq!(err.error().kind(), ErrorKind::Validation);
    }
}
