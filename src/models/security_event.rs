//! Security audit event models
//!
//! A `SecurityEvent` is written once and never mutated. Events carry the
//! subject identity (user id and/or the raw email supplied by the client,
//! since failed attempts may not resolve to a real user) but never secrets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ClientContext;

/// Kind of security-relevant event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    LoginAttempt,
    Registration,
    PasswordChange,
    PasswordResetRequest,
    PasswordResetComplete,
    EmailVerification,
    AccountLockout,
    AccountUnlock,
    SuspiciousActivity,
    SessionCreated,
    SessionExpired,
    TokenGenerated,
    TokenUsed,
}

impl SecurityEventType {
    /// All event types, in declaration order
    pub const ALL: [SecurityEventType; 13] = [
        SecurityEventType::LoginAttempt,
        SecurityEventType::Registration,
        SecurityEventType::PasswordChange,
        SecurityEventType::PasswordResetRequest,
        SecurityEventType::PasswordResetComplete,
        SecurityEventType::EmailVerification,
        SecurityEventType::AccountLockout,
        SecurityEventType::AccountUnlock,
        SecurityEventType::SuspiciousActivity,
        SecurityEventType::SessionCreated,
        SecurityEventType::SessionExpired,
        SecurityEventType::TokenGenerated,
        SecurityEventType::TokenUsed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginAttempt => "LOGIN_ATTEMPT",
            SecurityEventType::Registration => "REGISTRATION",
            SecurityEventType::PasswordChange => "PASSWORD_CHANGE",
            SecurityEventType::PasswordResetRequest => "PASSWORD_RESET_REQUEST",
            SecurityEventType::PasswordResetComplete => "PASSWORD_RESET_COMPLETE",
            SecurityEventType::EmailVerification => "EMAIL_VERIFICATION",
            SecurityEventType::AccountLockout => "ACCOUNT_LOCKOUT",
            SecurityEventType::AccountUnlock => "ACCOUNT_UNLOCK",
            SecurityEventType::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            SecurityEventType::SessionCreated => "SESSION_CREATED",
            SecurityEventType::SessionExpired => "SESSION_EXPIRED",
            SecurityEventType::TokenGenerated => "TOKEN_GENERATED",
            SecurityEventType::TokenUsed => "TOKEN_USED",
        }
    }
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SecurityEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        SecurityEventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| format!("Unknown security event type: {}", s))
    }
}

/// An append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    /// Row ID, assigned on insert
    pub id: Option<i64>,

    pub event_type: SecurityEventType,

    pub success: bool,

    pub user_id: Option<i64>,

    /// Email as supplied by the client
    pub email: Option<String>,

    pub ip_address: Option<String>,

    pub user_agent: Option<String>,

    /// Free-form structured detail; must not contain secrets
    pub details: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    /// Create a new event stamped with the current time
    pub fn new(event_type: SecurityEventType, success: bool) -> Self {
        Self {
            id: None,
            event_type,
            success,
            user_id: None,
            email: None,
            ip_address: None,
            user_agent: None,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Copy origin address and agent from the request context
    pub fn with_context(mut self, context: &ClientContext) -> Self {
        self.ip_address = context.ip_address.clone();
        self.user_agent = context.user_agent.clone();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Query filter for the security event log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Match any of these types; empty matches all
    pub event_types: Vec<SecurityEventType>,
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub ip_address: Option<String>,
    pub success: Option<bool>,
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, event_type: SecurityEventType) -> Self {
        self.event_types.push(event_type);
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Event type string form
    #[test]
    fn test_event_type_as_str() {
        assert_eq!(SecurityEventType::LoginAttempt.as_str(), "LOGIN_ATTEMPT");
        assert_eq!(
            SecurityEventType::PasswordResetRequest.to_string(),
            "PASSWORD_RESET_REQUEST"
        );
    }

    // Test 2: Every event type parses back from its name
    #[test]
    fn test_event_type_from_str() {
        for t in SecurityEventType::ALL {
            assert_eq!(t.as_str().parse::<SecurityEventType>().unwrap(), t);
        }
        assert_eq!(
            "account_lockout".parse::<SecurityEventType>().unwrap(),
            SecurityEventType::AccountLockout
        );
        assert!("NOT_A_TYPE".parse::<SecurityEventType>().is_err());
    }

    // Test 3: Serde uses the same names as as_str
    #[test]
    fn test_event_type_serde_matches_as_str() {
        for t in SecurityEventType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    // Test 4: Builder copies context
    #[test]
    fn test_event_builder() {
        let ctx = ClientContext::new()
            .with_ip("203.0.113.9")
            .with_user_agent("curl/8");
        let event = SecurityEvent::new(SecurityEventType::LoginAttempt, false)
            .with_email("someone@example.com")
            .with_context(&ctx)
            .with_details(serde_json::json!({"reason": "invalid_password"}));

        assert_eq!(event.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(event.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(event.email.as_deref(), Some("someone@example.com"));
        assert_eq!(event.details["reason"], "invalid_password");
        assert!(event.id.is_none());
    }
}
