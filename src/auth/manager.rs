//! Authentication service
//!
//! This module provides the account-facing operations of the marketplace:
//! registration, login with progressive lockout, email verification,
//! password reset and change, logout and administrative unlock.
//!
//! Every rejected attempt is written to the security event log before the
//! error is returned. Credential failures collapse to
//! [`AuthError::InvalidCredentials`] so responses never reveal whether an
//! account exists.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::SecurityEventLogger;
use crate::config::{bounded_seconds, AuthConfig};
use crate::database::{Database, TokenEffect};
use crate::error::{AuthError, DbError, PasswordError};
use crate::models::{
    ClientContext, IssuedSession, NewUser, SecurityEvent, SecurityEventType, TokenPurpose, User,
    UserProfile,
};
use crate::notify::{templates, Notifier};
use crate::otel::SecurityMetrics;

use super::password::PasswordService;
use super::ratelimit::{RateLimitOperation, RateLimiter};
use super::session::SessionManager;
use super::token::{hash_token, is_well_formed, TokenService};

/// Response to every password reset request, whether or not the email exists
pub const PASSWORD_RESET_MESSAGE: &str =
    "If an account exists for this email address, a password reset link has been sent.";

/// Response to every verification resend request
pub const VERIFICATION_RESEND_MESSAGE: &str =
    "If this email address belongs to an unverified account, a new verification link has been sent.";

/// Username accepted for administrative Basic authentication
pub const ADMIN_USERNAME: &str = "admin";

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// Registration input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Login input
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Password reset completion input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Authenticated password change input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Successful login
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user: UserProfile,
    pub session: IssuedSession,
}

/// Counts removed by a maintenance sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sessions: u64,
    pub rate_limit_windows: u64,
}

/// A rejected login, carried to the single place that logs it
struct LoginFailure {
    error: AuthError,
    reason: &'static str,
    user_id: Option<i64>,
    failed_attempts: Option<u32>,
}

impl LoginFailure {
    fn new(error: AuthError, reason: &'static str) -> Self {
        Self {
            error,
            reason,
            user_id: None,
            failed_attempts: None,
        }
    }

    fn for_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

impl From<AuthError> for LoginFailure {
    fn from(error: AuthError) -> Self {
        let reason = error.kind().as_str();
        Self::new(error, reason)
    }
}

impl From<DbError> for LoginFailure {
    fn from(error: DbError) -> Self {
        Self::from(AuthError::from(error))
    }
}

/// Authentication service
///
/// Stateless per request; all state lives in the database and the
/// rate limiter's counter store.
pub struct AuthService<D: Database> {
    db: Arc<D>,
    config: AuthConfig,
    passwords: PasswordService,
    tokens: TokenService<D>,
    sessions: SessionManager<D>,
    rate_limiter: Arc<RateLimiter>,
    audit: SecurityEventLogger<D>,
    notifier: Arc<dyn Notifier>,
    metrics: Option<Arc<SecurityMetrics>>,
}

impl<D: Database> AuthService<D> {
    /// Create a new authentication service
    ///
    /// Fails when the hashing parameters are below the safety floor.
    pub fn new(
        db: Arc<D>,
        config: AuthConfig,
        rate_limiter: Arc<RateLimiter>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, PasswordError> {
        let passwords = PasswordService::new(config.hashing)?;
        let tokens = TokenService::new(Arc::clone(&db), passwords.clone());
        let sessions = SessionManager::new(
            Arc::clone(&db),
            passwords.clone(),
            bounded_seconds(config.session.ttl_secs),
        );
        let audit = SecurityEventLogger::new(Arc::clone(&db));

        Ok(Self {
            db,
            config,
            passwords,
            tokens,
            sessions,
            rate_limiter,
            audit,
            notifier,
            metrics: None,
        })
    }

    /// Record metrics into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<SecurityMetrics>) -> Self {
        self.audit = self.audit.with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<D> {
        &self.db
    }

    pub fn audit(&self) -> &SecurityEventLogger<D> {
        &self.audit
    }

    pub fn sessions(&self) -> &SessionManager<D> {
        &self.sessions
    }

    pub fn passwords(&self) -> &PasswordService {
        &self.passwords
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    // =========================================================================
    // Registration and verification
    // =========================================================================

    /// Register a new, unverified account and send the verification email
    pub async fn register(
        &self,
        request: RegisterRequest,
        ctx: &ClientContext,
    ) -> Result<UserProfile, AuthError> {
        let email = normalize_email(&request.email);

        match self.attempt_register(&email, request, ctx).await {
            Ok(profile) => Ok(profile),
            Err(err) => {
                self.audit
                    .record(
                        SecurityEvent::new(SecurityEventType::Registration, false)
                            .with_email(email.as_str())
                            .with_context(ctx)
                            .with_details(json!({ "reason": err.kind().as_str() })),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn attempt_register(
        &self,
        email: &str,
        request: RegisterRequest,
        ctx: &ClientContext,
    ) -> Result<UserProfile, AuthError> {
        self.enforce(RateLimitOperation::Register, ctx.rate_limit_key())
            .await?;
        validate_email(email)?;

        let strength = self.passwords.validate_strength(&request.password);
        if !strength.valid {
            return Err(AuthError::validation("password", strength.errors));
        }

        let display_name = match request.display_name.as_deref().map(str::trim) {
            Some(name) if name.chars().count() > MAX_DISPLAY_NAME_LENGTH => {
                return Err(AuthError::validation(
                    "displayName",
                    vec![format!(
                        "Display name must be at most {} characters",
                        MAX_DISPLAY_NAME_LENGTH
                    )],
                ));
            }
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => None,
        };

        let password_hash = self.hash_password(&request.password).await?;
        let mut new_user = NewUser::new(email, password_hash);
        if let Some(name) = display_name {
            new_user = new_user.with_display_name(name);
        }

        let user = match self.db.create_user(&new_user).await {
            Ok(user) => user,
            Err(DbError::ConstraintViolation(_)) => return Err(AuthError::EmailAlreadyRegistered),
            Err(e) => return Err(e.into()),
        };

        let email_sent = self.send_verification(&user, ctx).await;

        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::Registration, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx)
                    .with_details(json!({ "verificationEmailSent": email_sent })),
            )
            .await;

        tracing::info!(user_id = user.id, email_sent = email_sent, "Account registered");
        Ok(user.profile())
    }

    /// Consume an email verification token
    pub async fn verify_email(
        &self,
        token: &str,
        ctx: &ClientContext,
    ) -> Result<UserProfile, AuthError> {
        let result = self
            .tokens
            .consume(
                token.trim(),
                TokenPurpose::EmailVerification,
                TokenEffect::MarkEmailVerified,
            )
            .await;

        let user_id = match result {
            Ok(user_id) => user_id,
            Err(err) => {
                self.audit
                    .record(
                        SecurityEvent::new(SecurityEventType::EmailVerification, false)
                            .with_context(ctx)
                            .with_details(json!({ "reason": err.kind().as_str() })),
                    )
                    .await;
                return Err(err);
            }
        };

        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::EmailVerification, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx),
            )
            .await;
        self.record_token_used(&user, TokenPurpose::EmailVerification, ctx)
            .await;

        tracing::info!(user_id = user.id, "Email verified");
        Ok(user.profile())
    }

    /// Reissue the verification email for an unverified account
    ///
    /// The response is the same whether or not the account exists.
    pub async fn resend_verification(
        &self,
        email: &str,
        ctx: &ClientContext,
    ) -> Result<&'static str, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        self.enforce(RateLimitOperation::VerificationResend, &email)
            .await?;

        match self.db.get_user_by_email(&email).await? {
            Some(user) if !user.email_verified => {
                self.send_verification(&user, ctx).await;
            }
            _ => {
                tracing::debug!("Verification resend for unknown or verified account ignored");
            }
        }

        Ok(VERIFICATION_RESEND_MESSAGE)
    }

    /// Issue a verification token and email it; true if the email went out
    async fn send_verification(&self, user: &User, ctx: &ClientContext) -> bool {
        let ttl = bounded_seconds(self.config.tokens.verification_ttl_secs);
        let token = match self
            .tokens
            .issue(user.id, TokenPurpose::EmailVerification, ttl)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(user_id = user.id, error = %e, "Failed to issue verification token");
                return false;
            }
        };
        self.record_token_generated(user, TokenPurpose::EmailVerification, ctx)
            .await;

        let message = templates::verification_email(
            &self.config.public_base_url,
            user.display_name.as_deref(),
            &token,
            ttl.num_hours(),
        );
        self.deliver(user, &message.subject, &message.body).await
    }

    // =========================================================================
    // Login and sessions
    // =========================================================================

    /// Authenticate with email and password and open a session
    pub async fn login(
        &self,
        request: LoginRequest,
        ctx: &ClientContext,
    ) -> Result<LoginSuccess, AuthError> {
        let email = normalize_email(&request.email);

        match self.attempt_login(&email, &request.password, ctx).await {
            Ok(success) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_login("success");
                }
                Ok(success)
            }
            Err(failure) => {
                let mut details = json!({ "reason": failure.reason });
                if let Some(attempts) = failure.failed_attempts {
                    details["failedAttempts"] = json!(attempts);
                }
                let mut event = SecurityEvent::new(SecurityEventType::LoginAttempt, false)
                    .with_email(email.as_str())
                    .with_context(ctx)
                    .with_details(details);
                if let Some(user_id) = failure.user_id {
                    event = event.with_user(user_id);
                }
                self.audit.record(event).await;

                if let Some(metrics) = &self.metrics {
                    metrics.record_login(failure.reason);
                }
                tracing::info!(reason = failure.reason, "Login rejected");
                Err(failure.error)
            }
        }
    }

    async fn attempt_login(
        &self,
        email: &str,
        password: &str,
        ctx: &ClientContext,
    ) -> Result<LoginSuccess, LoginFailure> {
        if email.is_empty() {
            return Err(AuthError::validation("email", vec!["Email is required".to_string()]).into());
        }
        if password.is_empty() {
            return Err(
                AuthError::validation("password", vec!["Password is required".to_string()]).into(),
            );
        }

        self.enforce(RateLimitOperation::LoginIp, ctx.rate_limit_key())
            .await?;
        self.enforce(RateLimitOperation::LoginAccount, email).await?;

        let now = Utc::now();
        let Some(user) = self.db.get_user_by_email(email).await? else {
            self.verify_dummy(password).await;
            return Err(LoginFailure::new(AuthError::InvalidCredentials, "unknown_user"));
        };

        if let Some(retry_after_secs) = user.lock_remaining_secs(now) {
            return Err(
                LoginFailure::new(AuthError::AccountLocked { retry_after_secs }, "account_locked")
                    .for_user(user.id),
            );
        }

        if self.config.require_email_verification && !user.email_verified {
            return Err(
                LoginFailure::new(AuthError::EmailNotVerified, "email_not_verified")
                    .for_user(user.id),
            );
        }

        if !self.verify_password(password, &user.password_hash).await? {
            let mut failure = LoginFailure::new(AuthError::InvalidCredentials, "invalid_password")
                .for_user(user.id);
            failure.failed_attempts = self.register_failed_attempt(&user, ctx).await;
            return Err(failure);
        }

        self.db
            .record_successful_login(user.id, ctx.ip_address.clone(), now)
            .await?;
        let session = self.sessions.create(user.id, ctx).await?;

        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::LoginAttempt, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx),
            )
            .await;
        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::SessionCreated, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx)
                    .with_details(json!({ "expiresAt": session.session.expires_at })),
            )
            .await;

        let mut profile = user.profile();
        profile.last_login_at = Some(now);

        tracing::info!(user_id = user.id, "Login succeeded");
        Ok(LoginSuccess {
            user: profile,
            session,
        })
    }

    /// Atomically count a failed login and lock the account at the threshold
    ///
    /// Returns the new counter value, or `None` if storage failed.
    async fn register_failed_attempt(&self, user: &User, ctx: &ClientContext) -> Option<u32> {
        let now = Utc::now();
        let lockout = &self.config.lockout;
        let lock_until = now + bounded_seconds(lockout.duration_secs);

        let outcome = match self
            .db
            .record_failed_login(user.id, lockout.threshold, lock_until, now)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(user_id = user.id, error = %e, "Failed to record failed login");
                return None;
            }
        };

        if outcome.newly_locked {
            if let Some(metrics) = &self.metrics {
                metrics.record_lockout();
            }
            self.audit
                .record(
                    SecurityEvent::new(SecurityEventType::AccountLockout, true)
                        .with_user(user.id)
                        .with_email(user.email.as_str())
                        .with_context(ctx)
                        .with_details(json!({
                            "failedAttempts": outcome.failed_attempts,
                            "lockedUntil": outcome.locked_until,
                            "durationSecs": lockout.duration_secs,
                        })),
                )
                .await;
            tracing::warn!(
                user_id = user.id,
                failed_attempts = outcome.failed_attempts,
                "Account locked after repeated failed logins"
            );
        }

        Some(outcome.failed_attempts)
    }

    /// Revoke the session behind `token`; succeeds for unknown tokens too
    pub async fn logout(&self, token: &str, ctx: &ClientContext) -> Result<(), AuthError> {
        let session = self.db.get_session(&hash_token(token)).await?;
        let revoked = self.sessions.revoke(token).await?;

        if let (true, Some(session)) = (revoked, session) {
            self.audit
                .record(
                    SecurityEvent::new(SecurityEventType::SessionExpired, true)
                        .with_user(session.user_id)
                        .with_context(ctx)
                        .with_details(json!({ "reason": "logout" })),
                )
                .await;
            tracing::info!(user_id = session.user_id, "Logged out");
        }

        Ok(())
    }

    /// Validate and touch a session, returning its owner's profile
    pub async fn current_session(&self, token: &str) -> Result<UserProfile, AuthError> {
        let session = self.sessions.lookup(token).await?;
        self.sessions.touch(token).await?;

        let user = self
            .db
            .get_user(session.user_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        Ok(user.profile())
    }

    // =========================================================================
    // Password reset and change
    // =========================================================================

    /// Start a password reset
    ///
    /// Always returns [`PASSWORD_RESET_MESSAGE`] so callers cannot learn
    /// whether the email is registered.
    pub async fn request_password_reset(
        &self,
        email: &str,
        ctx: &ClientContext,
    ) -> Result<&'static str, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;

        let limits = [
            (RateLimitOperation::PasswordResetIp, ctx.rate_limit_key()),
            (RateLimitOperation::PasswordReset, email.as_str()),
        ];
        for (operation, identifier) in limits {
            if let Err(err) = self.enforce(operation, identifier).await {
                self.audit
                    .record(
                        SecurityEvent::new(SecurityEventType::PasswordResetRequest, false)
                            .with_email(email.as_str())
                            .with_context(ctx)
                            .with_details(json!({ "reason": err.kind().as_str() })),
                    )
                    .await;
                return Err(err);
            }
        }

        let Some(user) = self.db.get_user_by_email(&email).await? else {
            self.audit
                .record(
                    SecurityEvent::new(SecurityEventType::PasswordResetRequest, false)
                        .with_email(email.as_str())
                        .with_context(ctx)
                        .with_details(json!({ "reason": "unknown_email" })),
                )
                .await;
            return Ok(PASSWORD_RESET_MESSAGE);
        };

        let ttl = bounded_seconds(self.config.tokens.password_reset_ttl_secs);
        let email_sent = match self
            .tokens
            .issue(user.id, TokenPurpose::PasswordReset, ttl)
            .await
        {
            Ok(token) => {
                self.record_token_generated(&user, TokenPurpose::PasswordReset, ctx)
                    .await;
                let message = templates::password_reset_email(
                    &self.config.public_base_url,
                    user.display_name.as_deref(),
                    &token,
                    ttl.num_minutes(),
                );
                self.deliver(&user, &message.subject, &message.body).await
            }
            Err(e) => {
                tracing::error!(user_id = user.id, error = %e, "Failed to issue password reset token");
                false
            }
        };

        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::PasswordResetRequest, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx)
                    .with_details(json!({ "emailSent": email_sent })),
            )
            .await;

        Ok(PASSWORD_RESET_MESSAGE)
    }

    /// Complete a password reset with a single-use token
    ///
    /// Clears any lockout and signs the user out everywhere.
    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
        ctx: &ClientContext,
    ) -> Result<(), AuthError> {
        match self.attempt_reset_password(request, ctx).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.audit
                    .record(
                        SecurityEvent::new(SecurityEventType::PasswordResetComplete, false)
                            .with_context(ctx)
                            .with_details(json!({ "reason": err.kind().as_str() })),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn attempt_reset_password(
        &self,
        request: ResetPasswordRequest,
        ctx: &ClientContext,
    ) -> Result<(), AuthError> {
        self.enforce(RateLimitOperation::PasswordResetComplete, ctx.rate_limit_key())
            .await?;

        let token = request.token.trim();
        if !is_well_formed(token) {
            return Err(AuthError::TokenInvalid);
        }
        self.check_new_password(&request.new_password, &request.confirm_password)?;

        let password_hash = self.hash_password(&request.new_password).await?;
        let user_id = self
            .tokens
            .consume(
                token,
                TokenPurpose::PasswordReset,
                TokenEffect::ReplacePassword { password_hash },
            )
            .await?;

        let Some(user) = self.db.get_user(user_id).await? else {
            return Err(AuthError::NotFound("User".to_string()));
        };

        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::PasswordResetComplete, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx),
            )
            .await;
        self.record_token_used(&user, TokenPurpose::PasswordReset, ctx)
            .await;
        self.notify_password_changed(&user).await;

        tracing::info!(user_id = user.id, "Password reset completed");
        Ok(())
    }

    /// Change the password of the session's owner
    ///
    /// Other sessions of the user are revoked; the current one is kept.
    pub async fn change_password(
        &self,
        session_token: &str,
        request: ChangePasswordRequest,
        ctx: &ClientContext,
    ) -> Result<(), AuthError> {
        let session = self.sessions.lookup(session_token).await?;
        let user = self
            .db
            .get_user(session.user_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        match self
            .attempt_change_password(&user, &session.token_hash, request)
            .await
        {
            Ok(revoked) => {
                self.audit
                    .record(
                        SecurityEvent::new(SecurityEventType::PasswordChange, true)
                            .with_user(user.id)
                            .with_email(user.email.as_str())
                            .with_context(ctx)
                            .with_details(json!({ "revokedSessions": revoked })),
                    )
                    .await;
                self.notify_password_changed(&user).await;
                tracing::info!(user_id = user.id, revoked_sessions = revoked, "Password changed");
                Ok(())
            }
            Err(err) => {
                self.audit
                    .record(
                        SecurityEvent::new(SecurityEventType::PasswordChange, false)
                            .with_user(user.id)
                            .with_email(user.email.as_str())
                            .with_context(ctx)
                            .with_details(json!({ "reason": err.kind().as_str() })),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn attempt_change_password(
        &self,
        user: &User,
        session_hash: &str,
        request: ChangePasswordRequest,
    ) -> Result<u64, AuthError> {
        self.enforce(RateLimitOperation::PasswordChange, &user.id.to_string())
            .await?;

        if !self
            .verify_password(&request.current_password, &user.password_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }
        self.check_new_password(&request.new_password, &request.confirm_password)?;

        let password_hash = self.hash_password(&request.new_password).await?;
        let revoked = self
            .db
            .update_password(
                user.id,
                &password_hash,
                Some(session_hash.to_string()),
                Utc::now(),
            )
            .await?;
        Ok(revoked)
    }

    /// Confirmation and strength checks shared by reset and change
    fn check_new_password(&self, new_password: &str, confirm_password: &str) -> Result<(), AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::validation(
                "confirmPassword",
                vec!["Passwords do not match".to_string()],
            ));
        }
        let strength = self.passwords.validate_strength(new_password);
        if !strength.valid {
            return Err(AuthError::validation("newPassword", strength.errors));
        }
        Ok(())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Check administrative Basic credentials
    pub async fn verify_admin(
        &self,
        username: &str,
        password: &str,
        ctx: &ClientContext,
    ) -> Result<(), AuthError> {
        self.enforce(RateLimitOperation::AdminAuth, ctx.rate_limit_key())
            .await?;

        let Some(admin_hash) = self.config.admin_password_hash.as_deref() else {
            return Err(AuthError::Unauthorized);
        };

        let valid = if username == ADMIN_USERNAME {
            self.verify_password(password, admin_hash).await?
        } else {
            self.verify_dummy(password).await;
            false
        };

        if !valid {
            self.audit
                .record(
                    SecurityEvent::new(SecurityEventType::LoginAttempt, false)
                        .with_context(ctx)
                        .with_details(json!({ "scope": "admin", "reason": "invalid_credentials" })),
                )
                .await;
            return Err(AuthError::Unauthorized);
        }

        Ok(())
    }

    /// Lift a lockout and reset the account's login rate-limit window
    pub async fn unlock_account(
        &self,
        user_id: i64,
        unlocked_by: &str,
        ctx: &ClientContext,
    ) -> Result<UserProfile, AuthError> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        self.db.unlock_user(user.id, Utc::now()).await?;
        self.rate_limiter
            .reset(RateLimitOperation::LoginAccount, &user.email)
            .await?;

        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::AccountUnlock, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx)
                    .with_details(json!({
                        "unlockedBy": unlocked_by,
                        "wasLocked": user.is_locked(Utc::now()),
                    })),
            )
            .await;

        tracing::info!(user_id = user.id, unlocked_by = %unlocked_by, "Account unlocked");
        Ok(user.profile())
    }

    /// Delete expired sessions and elapsed rate-limit windows
    pub async fn sweep_expired(&self) -> Result<SweepReport, AuthError> {
        let sessions = self.sessions.sweep_expired().await?;
        let rate_limit_windows = self.rate_limiter.sweep_expired().await?;
        Ok(SweepReport {
            sessions,
            rate_limit_windows,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Consume rate-limit quota, failing with `RateLimitExceeded` when exhausted
    async fn enforce(
        &self,
        operation: RateLimitOperation,
        identifier: &str,
    ) -> Result<(), AuthError> {
        let decision = self.rate_limiter.check(operation, identifier).await?;
        if decision.allowed {
            return Ok(());
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_rate_limited(operation.as_str());
        }
        Err(decision.into_error())
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let passwords = self.passwords.clone();
        let password = password.to_string();
        let started = Instant::now();

        let hash = tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|e| AuthError::ServiceUnavailable(format!("hashing task failed: {}", e)))??;

        self.observe_hash("hash", started);
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let passwords = self.passwords.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        let started = Instant::now();

        let valid = tokio::task::spawn_blocking(move || passwords.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::ServiceUnavailable(format!("hashing task failed: {}", e)))?;

        self.observe_hash("verify", started);
        Ok(valid)
    }

    async fn verify_dummy(&self, password: &str) {
        let passwords = self.passwords.clone();
        let password = password.to_string();
        let started = Instant::now();

        if let Err(e) =
            tokio::task::spawn_blocking(move || passwords.verify_dummy(&password)).await
        {
            tracing::warn!(error = %e, "Dummy verification task failed");
        }
        self.observe_hash("verify", started);
    }

    fn observe_hash(&self, operation: &str, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_hash_duration(operation, started.elapsed().as_secs_f64());
        }
    }

    /// Send a message to the user; delivery failures are logged only
    async fn deliver(&self, user: &User, subject: &str, body: &str) -> bool {
        match self.notifier.send(&user.email, subject, body).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user_id = user.id, subject = %subject, error = %e, "Notification delivery failed");
                false
            }
        }
    }

    async fn notify_password_changed(&self, user: &User) {
        let message = templates::password_changed_email(user.display_name.as_deref());
        self.deliver(user, &message.subject, &message.body).await;
    }

    async fn record_token_generated(&self, user: &User, purpose: TokenPurpose, ctx: &ClientContext) {
        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::TokenGenerated, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx)
                    .with_details(json!({ "purpose": purpose.as_str() })),
            )
            .await;
    }

    async fn record_token_used(&self, user: &User, purpose: TokenPurpose, ctx: &ClientContext) {
        self.audit
            .record(
                SecurityEvent::new(SecurityEventType::TokenUsed, true)
                    .with_user(user.id)
                    .with_email(user.email.as_str())
                    .with_context(ctx)
                    .with_details(json!({ "purpose": purpose.as_str() })),
            )
            .await;
    }
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check the shape of a normalized email address
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::validation(
            "email",
            vec!["Email is required".to_string()],
        ));
    }

    let valid = email.len() <= MAX_EMAIL_LENGTH
        && !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };

    if valid {
        Ok(())
    } else {
        Err(AuthError::validation(
            "email",
            vec!["Email address is invalid".to_string()],
        ))
    }
}
