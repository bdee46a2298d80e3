//! Security monitoring
//!
//! Threshold rules over the security event log and the scheduler that
//! evaluates them periodically.

pub mod rules;
pub mod scheduler;

pub use rules::{evaluate, Finding, Grouping, Rule, RULES, SYSTEM_SUBJECT};
pub use scheduler::{CycleReport, MonitorStatus, SecurityMonitor};
