//! Database layer for marketplace-auth
//!
//! This module defines the storage trait and its SQLite implementation.
//! Every operation that must be atomic with respect to concurrent requests
//! (failed-login counting, token consumption) is a single method here so
//! the implementation can run it as one statement or transaction.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteDatabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::models::{AuthSession, EventFilter, NewUser, SecurityEvent, TokenPurpose, User};

/// Result of an atomic failed-login update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLoginOutcome {
    /// Counter value after the increment
    pub failed_attempts: u32,

    /// Lock in effect after the update
    pub locked_until: Option<DateTime<Utc>>,

    /// This update is the one that set the lock
    pub newly_locked: bool,
}

/// Side effect applied in the same transaction that consumes a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEffect {
    /// Mark the owner's email as verified
    MarkEmailVerified,

    /// Replace the password hash, clear lockout and delete all sessions
    ReplacePassword { password_hash: String },
}

/// Outcome of a token consumption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenConsumption {
    /// Token matched and was cleared; the effect has been applied
    Consumed { user_id: i64 },

    /// No live or expired token with this digest
    NotFound,

    /// Token matched but had expired; it has been cleared
    Expired,
}

/// Database trait for data persistence
///
/// This trait defines all database operations needed by the authentication
/// core. It uses `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Database: Send + Sync {
    // =========================================================================
    // User operations
    // =========================================================================

    /// Create a user; fails with `ConstraintViolation` when the email exists
    async fn create_user(&self, user: &NewUser) -> Result<User, DbError>;

    /// Get a user by ID
    async fn get_user(&self, id: i64) -> Result<Option<User>, DbError>;

    /// Get a user by email (case-insensitive)
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    /// Atomically increment the failed-login counter and apply the lock
    ///
    /// A lock that has already elapsed restarts the count at one. The lock is
    /// set to `lock_until` when the new count reaches `threshold`, and an
    /// active lock is never shortened.
    async fn record_failed_login(
        &self,
        user_id: i64,
        threshold: u32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<FailedLoginOutcome, DbError>;

    /// Reset the counter, clear the lock and stamp the last login
    async fn record_successful_login(
        &self,
        user_id: i64,
        ip_address: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Clear the counter and lock; `NotFound` for unknown users
    async fn unlock_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<(), DbError>;

    /// Replace the password hash and delete the user's sessions except `keep_session`
    ///
    /// Returns the number of deleted sessions.
    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        keep_session: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError>;

    // =========================================================================
    // Single-use token operations
    // =========================================================================

    /// Store a token digest, replacing any previous token of the same purpose
    async fn store_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Clear a live token and apply `effect` in one transaction
    async fn consume_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &str,
        effect: TokenEffect,
        now: DateTime<Utc>,
    ) -> Result<TokenConsumption, DbError>;

    // =========================================================================
    // Session operations
    // =========================================================================

    /// Persist a new session
    async fn create_session(&self, session: &AuthSession) -> Result<(), DbError>;

    /// Get a session by token digest
    async fn get_session(&self, token_hash: &str) -> Result<Option<AuthSession>, DbError>;

    /// Bump last access of a live session; false if absent or expired
    async fn touch_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, DbError>;

    /// Delete one session; false if it did not exist
    async fn delete_session(&self, token_hash: &str) -> Result<bool, DbError>;

    /// Delete all sessions of a user except `except_token_hash`
    async fn delete_user_sessions(
        &self,
        user_id: i64,
        except_token_hash: Option<String>,
    ) -> Result<u64, DbError>;

    /// Delete sessions whose expiry is at or before `now`
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, DbError>;

    // =========================================================================
    // Security event operations
    // =========================================================================

    /// Append a security event, returning its ID
    async fn insert_security_event(&self, event: &SecurityEvent) -> Result<i64, DbError>;

    /// Query security events, newest first
    async fn query_security_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<SecurityEvent>, DbError>;

    /// Delete events created before `cutoff` (retention)
    async fn delete_security_events_before(&self, cutoff: DateTime<Utc>)
        -> Result<u64, DbError>;
}
