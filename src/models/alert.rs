//! Monitoring alert models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a monitoring rule detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Many failed logins from one address
    FailedLoginSpike,
    /// Many failed logins against one account
    CredentialStuffing,
    /// Many accounts locked system-wide
    LockoutSurge,
    /// Many password reset requests from one address
    ResetFlood,
    /// One account logging in from many addresses
    IpVelocity,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::FailedLoginSpike => "failed_login_spike",
            AlertKind::CredentialStuffing => "credential_stuffing",
            AlertKind::LockoutSurge => "lockout_surge",
            AlertKind::ResetFlood => "reset_flood",
            AlertKind::IpVelocity => "ip_velocity",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A raised monitoring alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub severity: Severity,
    /// Address, email, user id or `system`, depending on the rule
    pub subject: String,
    /// Matching events observed in the current window
    pub event_count: u32,
    pub threshold: u32,
    pub window_minutes: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

impl Alert {
    /// An alert is active until it is acknowledged
    pub fn is_active(&self) -> bool {
        self.acknowledged_at.is_none()
    }
}
