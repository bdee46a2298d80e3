//! User credential record and related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A marketplace account as stored in the credential table
///
/// Single-use token digests live in the same row but are never loaded into
/// this struct; they are only touched by the token operations in the
/// storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID
    pub id: i64,

    /// Normalized (trimmed, lowercase) email address
    pub email: String,

    /// Optional display name
    pub display_name: Option<String>,

    /// Algorithm-tagged PHC password hash
    pub password_hash: String,

    /// Whether the email address has been verified
    pub email_verified: bool,

    /// Consecutive failed login attempts
    pub failed_login_attempts: u32,

    /// Login is refused until this time
    pub locked_until: Option<DateTime<Utc>>,

    /// Last successful login
    pub last_login_at: Option<DateTime<Utc>>,

    /// Address of the last successful login
    pub last_login_ip: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Check whether the account is locked at `now`
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    /// Seconds until the lock lifts, rounded up; `None` when not locked
    pub fn lock_remaining_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        match self.locked_until {
            Some(until) if until > now => {
                let millis = (until - now).num_milliseconds().max(0) as u64;
                Some(millis.div_ceil(1000).max(1))
            }
            _ => None,
        }
    }

    /// Public view of this account
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            email_verified: self.email_verified,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        }
    }
}

/// Data required to create an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
}

impl NewUser {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: None,
            password_hash: password_hash.into(),
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Account fields safe to return to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Purpose of a single-use token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
