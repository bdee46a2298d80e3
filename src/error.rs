//! Application error types for marketplace-auth
//!
//! This module defines the error taxonomy used throughout the crate.
//! `AuthError` is the closed set of outcomes a caller of the
//! authentication core can observe; callers switch on [`AuthError::kind`],
//! never on message text. All error types use `thiserror`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors returned at the authentication service boundary
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// Field-level input validation failure, safe to disclose
    #[error("Validation failed for {field}: {}", .errors.join("; "))]
    Validation { field: String, errors: Vec<String> },

    /// Generic credential failure; never says which part was wrong
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Account temporarily locked after repeated failures
    #[error("Account is temporarily locked, try again in {retry_after_secs} seconds")]
    AccountLocked { retry_after_secs: u64 },

    /// Email address has not been verified yet
    #[error("Email address has not been verified")]
    EmailNotVerified,

    /// Too many requests for this operation
    #[error("Too many requests, try again in {retry_after_secs} seconds")]
    RateLimitExceeded {
        limit: u32,
        retry_after_secs: u64,
        reset_at: DateTime<Utc>,
    },

    /// Single-use token unknown or already consumed
    #[error("Token is invalid or has already been used")]
    TokenInvalid,

    /// Single-use token past its expiry
    #[error("Token has expired, please request a new one")]
    TokenExpired,

    /// Session past its expiry
    #[error("Session has expired")]
    SessionExpired,

    /// Session token unknown
    #[error("Session not found")]
    SessionNotFound,

    /// Registration with an email that already has an account
    #[error("An account with this email address already exists")]
    EmailAlreadyRegistered,

    /// Missing or rejected administrative credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Referenced entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Downstream storage or delivery failure
    #[error("Service temporarily unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Machine-readable discriminant of an [`AuthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidCredentials,
    AccountLocked,
    EmailNotVerified,
    RateLimitExceeded,
    TokenInvalid,
    TokenExpired,
    SessionExpired,
    SessionNotFound,
    EmailAlreadyRegistered,
    Unauthorized,
    NotFound,
    ServiceUnavailable,
}

impl ErrorKind {
    /// Stable snake_case name, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::AccountLocked => "account_locked",
            ErrorKind::EmailNotVerified => "email_not_verified",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::TokenInvalid => "token_invalid",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::EmailAlreadyRegistered => "email_already_registered",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl AuthError {
    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation { .. } => ErrorKind::Validation,
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::AccountLocked { .. } => ErrorKind::AccountLocked,
            AuthError::EmailNotVerified => ErrorKind::EmailNotVerified,
            AuthError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            AuthError::TokenInvalid => ErrorKind::TokenInvalid,
            AuthError::TokenExpired => ErrorKind::TokenExpired,
            AuthError::SessionExpired => ErrorKind::SessionExpired,
            AuthError::SessionNotFound => ErrorKind::SessionNotFound,
            AuthError::EmailAlreadyRegistered => ErrorKind::EmailAlreadyRegistered,
            AuthError::Unauthorized => ErrorKind::Unauthorized,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
        }
    }

    /// Build a validation error for a single field
    pub fn validation(field: impl Into<String>, errors: Vec<String>) -> Self {
        AuthError::Validation {
            field: field.into(),
            errors,
        }
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        AuthError::ServiceUnavailable(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::EmptyPassword => {
                AuthError::validation("password", vec!["Password is required".to_string()])
            }
            other => AuthError::ServiceUnavailable(other.to_string()),
        }
    }
}

/// Password hashing and random generation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PasswordError {
    /// Empty input given to the hasher
    #[error("Password is required")]
    EmptyPassword,

    /// Requested token length is below the entropy floor
    #[error("Token length {requested} bytes is below the minimum of {minimum} bytes")]
    InsufficientEntropy { requested: usize, minimum: usize },

    /// Hashing parameters weaker than the safety floor
    #[error("Hashing parameters below safety floor: {0}")]
    WeakParameters(String),

    /// Underlying hash computation failed
    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Async connection error
    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    /// Record not found
    #[error("Record not found")]
    NotFound,

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Notification delivery errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NotifyError {
    /// Message could not be delivered
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Recipient address rejected
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Security monitoring errors
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No alert with the given id
    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    /// Threshold update rejected
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// Event log could not be read
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

/// Application-level error that wraps all other errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Password service error
    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Notification error
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Monitoring error
    #[error("Monitoring error: {0}")]
    Monitor(#[from] MonitorError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: AuthError display messages
    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
        assert_eq!(
            AuthError::AccountLocked {
                retry_after_secs: 120
            }
            .to_string(),
            "Account is temporarily locked, try again in 120 seconds"
        );
        assert_eq!(
            AuthError::TokenExpired.to_string(),
            "Token has expired, please request a new one"
        );
        assert_eq!(
            AuthError::NotFound("Alert".to_string()).to_string(),
            "Alert not found"
        );
    }

    // Test 2: Validation error joins all messages
    #[test]
    fn test_validation_error_display() {
        let err = AuthError::validation(
            "password",
            vec!["too short".to_string(), "needs a number".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "Validation failed for password: too short; needs a number"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    // Test 3: kind() is stable for each variant
    #[test]
    fn test_auth_error_kind() {
        assert_eq!(
            AuthError::InvalidCredentials.kind(),
            ErrorKind::InvalidCredentials
        );
        assert_eq!(
            AuthError::RateLimitExceeded {
                limit: 3,
                retry_after_secs: 10,
                reset_at: Utc::now(),
            }
            .kind(),
            ErrorKind::RateLimitExceeded
        );
        assert_eq!(AuthError::TokenInvalid.kind(), ErrorKind::TokenInvalid);
        assert_eq!(
            AuthError::ServiceUnavailable("db".into()).kind(),
            ErrorKind::ServiceUnavailable
        );
    }

    // Test 4: ErrorKind serializes as snake_case
    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::EmailNotVerified).unwrap();
        assert_eq!(json, "\"email_not_verified\"");
        let json = serde_json::to_string(&ErrorKind::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"rate_limit_exceeded\"");

        for kind in [
            ErrorKind::AccountLocked,
            ErrorKind::TokenExpired,
            ErrorKind::SessionNotFound,
            ErrorKind::ServiceUnavailable,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    // Test 5: DbError converts into ServiceUnavailable
    #[test]
    fn test_db_error_into_auth_error() {
        let err: AuthError = DbError::NotFound.into();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }

    // Test 6: Empty password maps to a validation error
    #[test]
    fn test_password_error_into_auth_error() {
        let err: AuthError = PasswordError::EmptyPassword.into();
        match err {
            AuthError::Validation { field, errors } => {
                assert_eq!(field, "password");
                assert_eq!(errors, vec!["Password is required".to_string()]);
            }
            other => panic!("Expected validation error, got {:?}", other),
        }

        let err: AuthError = PasswordError::Hash("boom".into()).into();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }

    // Test 7: AppError wraps nested errors
    #[test]
    fn test_app_error_from_conversions() {
        let app: AppError = AuthError::EmailNotVerified.into();
        assert!(matches!(app, AppError::Auth(_)));

        let app: AppError = MonitorError::AlertNotFound("x".into()).into();
        assert_eq!(app.to_string(), "Monitoring error: Alert not found: x");

        let app: AppError = NotifyError::Delivery("smtp down".into()).into();
        assert!(matches!(app, AppError::Notify(_)));
    }
}
