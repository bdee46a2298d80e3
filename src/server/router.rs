//! HTTP router for marketplace-auth
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health checks
//! - Registration, email verification, login and logout
//! - Password reset and change
//! - Administrative security endpoints (monitoring, events, unlock)

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{
    AuthService, ChangePasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
};
use crate::config::Threshold;
use crate::database::Database;
use crate::error::AuthError;
use crate::models::{EventFilter, SecurityEventType};
use crate::monitor::SecurityMonitor;

use super::middleware::{rate_limit_headers, AdminUser, ApiError, ClientInfo, SessionToken};

/// Default and maximum page size for `GET /security/events`
const DEFAULT_EVENT_LIMIT: u32 = 100;
const MAX_EVENT_LIMIT: u32 = 1000;

/// Shared application state
pub struct AppState<D: Database> {
    /// Authentication service
    pub auth: Arc<AuthService<D>>,

    /// Security monitoring scheduler
    pub monitor: Arc<SecurityMonitor<D>>,

    /// Use X-Forwarded-For as the client address
    pub trust_forwarded_for: bool,
}

impl<D: Database> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            monitor: Arc::clone(&self.monitor),
            trust_forwarded_for: self.trust_forwarded_for,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the main application router
pub fn build_router<D: Database + 'static>(state: AppState<D>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Account endpoints
        .route("/register", post(register_handler::<D>))
        .route("/login", post(login_handler::<D>))
        .route("/logout", post(logout_handler::<D>))
        .route("/session", get(session_handler::<D>))
        .route(
            "/verify-email",
            get(verify_email_query_handler::<D>).post(verify_email_handler::<D>),
        )
        .route("/verify-email/resend", post(resend_verification_handler::<D>))
        .route(
            "/password-reset",
            post(request_password_reset_handler::<D>).put(reset_password_handler::<D>),
        )
        .route("/password/change", post(change_password_handler::<D>))
        // Admin endpoints
        .route(
            "/security/monitoring",
            get(monitoring_status_handler::<D>).post(monitoring_action_handler::<D>),
        )
        .route("/security/events", get(security_events_handler::<D>))
        .route(
            "/security/accounts/:id/unlock",
            post(unlock_account_handler::<D>),
        )
        .layer(axum::middleware::from_fn(rate_limit_headers))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Account Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct EmailBody {
    #[serde(default)]
    email: String,
}

async fn register_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.register(request, &ctx).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": user,
            "message": "Registration successful. Please check your email to verify your account.",
        })),
    ))
}

async fn login_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let success = state.auth.login(request, &ctx).await?;
    Ok(Json(json!({
        "user": success.user,
        "session": {
            "token": success.session.token,
            "expiresAt": success.session.session.expires_at,
        },
    })))
}

async fn logout_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    SessionToken(token): SessionToken,
) -> Result<Json<Value>, ApiError> {
    state.auth.logout(&token, &ctx).await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

async fn session_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    SessionToken(token): SessionToken,
) -> Result<Json<Value>, ApiError> {
    let user = state.auth.current_session(&token).await?;
    Ok(Json(json!({ "user": user })))
}

async fn verify_email_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    Json(body): Json<TokenBody>,
) -> Result<Json<Value>, ApiError> {
    verify_email(&state, &body.token, &ctx).await
}

async fn verify_email_query_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    Query(query): Query<TokenBody>,
) -> Result<Json<Value>, ApiError> {
    verify_email(&state, &query.token, &ctx).await
}

async fn verify_email<D: Database + 'static>(
    state: &AppState<D>,
    token: &str,
    ctx: &crate::models::ClientContext,
) -> Result<Json<Value>, ApiError> {
    if token.trim().is_empty() {
        return Err(AuthError::validation("token", vec!["Token is required".to_string()]).into());
    }
    let user = state.auth.verify_email(token, ctx).await?;
    Ok(Json(json!({ "user": user, "message": "Email verified" })))
}

async fn resend_verification_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    Json(body): Json<EmailBody>,
) -> Result<Json<Value>, ApiError> {
    let message = state.auth.resend_verification(&body.email, &ctx).await?;
    Ok(Json(json!({ "message": message })))
}

async fn request_password_reset_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    Json(body): Json<EmailBody>,
) -> Result<Json<Value>, ApiError> {
    let message = state.auth.request_password_reset(&body.email, &ctx).await?;
    Ok(Json(json!({ "message": message })))
}

async fn reset_password_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    state.auth.reset_password(request, &ctx).await?;
    Ok(Json(json!({
        "message": "Password has been reset. Please log in with your new password."
    })))
}

async fn change_password_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    ClientInfo(ctx): ClientInfo,
    SessionToken(token): SessionToken,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    state.auth.change_password(&token, request, &ctx).await?;
    Ok(Json(json!({ "message": "Password changed" })))
}

// =============================================================================
// Admin Handlers
// =============================================================================

/// Control actions accepted by `POST /security/monitoring`
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum MonitoringAction {
    Start,
    Stop,
    RunNow,
    #[serde(rename_all = "camelCase")]
    Acknowledge {
        alert_id: String,
        #[serde(default)]
        acknowledged_by: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateThreshold {
        threshold: String,
        count: u32,
        window_minutes: u32,
    },
}

async fn monitoring_status_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    _admin: AdminUser,
) -> Json<Value> {
    let status = state.monitor.status().await;
    let alerts = state.monitor.active_alerts().await;
    Json(json!({ "status": status, "alerts": alerts }))
}

async fn monitoring_action_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    admin: AdminUser,
    Json(action): Json<MonitoringAction>,
) -> Result<Json<Value>, ApiError> {
    let monitor = &state.monitor;

    let body = match action {
        MonitoringAction::Start => {
            let started = monitor.start().await;
            json!({ "started": started, "status": monitor.status().await })
        }
        MonitoringAction::Stop => {
            let stopped = monitor.stop().await;
            json!({ "stopped": stopped, "status": monitor.status().await })
        }
        MonitoringAction::RunNow => {
            let report = monitor.run_now().await?;
            json!({ "report": report, "alerts": monitor.active_alerts().await })
        }
        MonitoringAction::Acknowledge {
            alert_id,
            acknowledged_by,
        } => {
            let by = acknowledged_by.unwrap_or(admin.username);
            let alert = monitor.acknowledge(&alert_id, &by).await?;
            json!({ "alert": alert })
        }
        MonitoringAction::UpdateThreshold {
            threshold,
            count,
            window_minutes,
        } => {
            let updated = Threshold::new(count, window_minutes);
            let previous = monitor.update_threshold(&threshold, updated).await?;
            json!({ "threshold": threshold, "previous": previous, "current": updated })
        }
    };

    Ok(Json(body))
}

/// Query parameters for `GET /security/events`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventQuery {
    #[serde(rename = "type")]
    event_type: Option<String>,
    user_id: Option<i64>,
    email: Option<String>,
    ip: Option<String>,
    success: Option<bool>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: Option<u32>,
}

impl EventQuery {
    fn into_filter(self) -> Result<EventFilter, AuthError> {
        let mut filter = EventFilter::new()
            .with_limit(self.limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, MAX_EVENT_LIMIT));

        if let Some(name) = self.event_type {
            let event_type = name.parse::<SecurityEventType>().map_err(|_| {
                AuthError::validation("type", vec![format!("Unknown event type {}", name)])
            })?;
            filter = filter.with_type(event_type);
        }
        if let Some(user_id) = self.user_id {
            filter = filter.with_user(user_id);
        }
        if let Some(email) = self.email {
            filter = filter.with_email(email.trim().to_lowercase());
        }
        if let Some(ip) = self.ip {
            filter = filter.with_ip(ip);
        }
        if let Some(success) = self.success {
            filter = filter.with_success(success);
        }
        if let Some(since) = self.since {
            filter = filter.since(since);
        }
        if let Some(until) = self.until {
            filter = filter.until(until);
        }
        Ok(filter)
    }
}

async fn security_events_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    _admin: AdminUser,
    Query(query): Query<EventQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = query.into_filter()?;
    let events = state
        .auth
        .audit()
        .query(&filter)
        .await
        .map_err(AuthError::from)?;
    Ok(Json(json!({ "total": events.len(), "events": events })))
}

async fn unlock_account_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .auth
        .unlock_account(id, &admin.username, &admin.context)
        .await?;
    Ok(Json(json!({ "user": user, "message": "Account unlocked" })))
}
