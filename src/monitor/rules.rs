//! Threshold rules evaluated against the security event log
//!
//! Evaluation is pure: the scheduler fetches the events for a rule's window
//! and hands them to [`evaluate`], which groups them by the rule's subject
//! and reports every group at or above the threshold.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};

use crate::config::Threshold;
use crate::models::{AlertKind, EventFilter, SecurityEvent, SecurityEventType, Severity};

/// Subject used for system-wide rules
pub const SYSTEM_SUBJECT: &str = "system";

/// How matching events are grouped into alert subjects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// One subject per origin address
    OriginAddress,
    /// One subject per email
    Email,
    /// A single system-wide subject
    System,
    /// One subject per user id, counting distinct origin addresses
    DistinctAddressesPerUser,
}

/// A monitoring rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Name of the threshold in configuration
    pub name: &'static str,
    pub kind: AlertKind,
    pub severity: Severity,
    pub event_type: SecurityEventType,
    /// Only events with this outcome match; `None` matches both
    pub success: Option<bool>,
    pub grouping: Grouping,
}

pub const RULES: [Rule; 5] = [
    Rule {
        name: "failed_logins_per_ip",
        kind: AlertKind::FailedLoginSpike,
        severity: Severity::High,
        event_type: SecurityEventType::LoginAttempt,
        success: Some(false),
        grouping: Grouping::OriginAddress,
    },
    Rule {
        name: "failed_logins_per_account",
        kind: AlertKind::CredentialStuffing,
        severity: Severity::Medium,
        event_type: SecurityEventType::LoginAttempt,
        success: Some(false),
        grouping: Grouping::Email,
    },
    Rule {
        name: "account_lockouts",
        kind: AlertKind::LockoutSurge,
        severity: Severity::High,
        event_type: SecurityEventType::AccountLockout,
        success: None,
        grouping: Grouping::System,
    },
    Rule {
        name: "password_resets_per_ip",
        kind: AlertKind::ResetFlood,
        severity: Severity::Medium,
        event_type: SecurityEventType::PasswordResetRequest,
        success: None,
        grouping: Grouping::OriginAddress,
    },
    Rule {
        name: "ip_velocity",
        kind: AlertKind::IpVelocity,
        severity: Severity::Medium,
        event_type: SecurityEventType::LoginAttempt,
        success: Some(true),
        grouping: Grouping::DistinctAddressesPerUser,
    },
];

impl Rule {
    /// Look up a rule by its threshold name
    pub fn by_name(name: &str) -> Option<&'static Rule> {
        RULES.iter().find(|rule| rule.name == name)
    }

    /// Event log filter covering this rule's window ending at `now`
    pub fn filter(&self, threshold: Threshold, now: DateTime<Utc>) -> EventFilter {
        let mut filter = EventFilter::new()
            .with_type(self.event_type)
            .since(now - Duration::minutes(i64::from(threshold.window_minutes)));
        if let Some(success) = self.success {
            filter = filter.with_success(success);
        }
        filter
    }
}

/// A group of events that reached a rule's threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: AlertKind,
    pub severity: Severity,
    pub subject: String,
    pub event_count: u32,
    pub threshold: u32,
    pub window_minutes: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Default)]
struct Group {
    count: u32,
    addresses: BTreeSet<String>,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

impl Group {
    fn add(&mut self, event: &SecurityEvent) {
        self.count += 1;
        if let Some(ip) = &event.ip_address {
            self.addresses.insert(ip.clone());
        }
        self.first_seen = Some(match self.first_seen {
            Some(seen) if seen <= event.created_at => seen,
            _ => event.created_at,
        });
        self.last_seen = Some(match self.last_seen {
            Some(seen) if seen >= event.created_at => seen,
            _ => event.created_at,
        });
    }
}

fn subject_of(grouping: Grouping, event: &SecurityEvent) -> Option<String> {
    match grouping {
        Grouping::OriginAddress => event.ip_address.clone(),
        Grouping::Email => event.email.as_ref().map(|e| e.trim().to_lowercase()),
        Grouping::System => Some(SYSTEM_SUBJECT.to_string()),
        Grouping::DistinctAddressesPerUser => event.user_id.map(|id| id.to_string()),
    }
}

/// Group `events` by subject and report the groups over threshold
///
/// `acknowledged` maps a subject to the time its last alert of this kind was
/// acknowledged; events at or before that time are ignored for the subject.
pub fn evaluate(
    rule: &Rule,
    threshold: Threshold,
    events: &[SecurityEvent],
    acknowledged: &HashMap<String, DateTime<Utc>>,
) -> Vec<Finding> {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();

    for event in events {
        if event.event_type != rule.event_type {
            continue;
        }
        if rule.success.is_some_and(|success| success != event.success) {
            continue;
        }
        let Some(subject) = subject_of(rule.grouping, event) else {
            continue;
        };
        if matches!(acknowledged.get(&subject), Some(at) if event.created_at <= *at) {
            continue;
        }
        groups.entry(subject).or_default().add(event);
    }

    groups
        .into_iter()
        .filter_map(|(subject, group)| {
            let event_count = match rule.grouping {
                Grouping::DistinctAddressesPerUser => group.addresses.len() as u32,
                _ => group.count,
            };
            if event_count < threshold.count {
                return None;
            }
            Some(Finding {
                kind: rule.kind,
                severity: rule.severity,
                subject,
                event_count,
                threshold: threshold.count,
                window_minutes: threshold.window_minutes,
                first_seen: group.first_seen?,
                last_seen: group.last_seen?,
            })
        })
        .collect()
}
