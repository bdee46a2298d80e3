//! Security audit trail
//!
//! [`SecurityEventLogger::record`] never fails its caller. When the event
//! cannot be persisted it is emitted in full on the `security_audit`
//! tracing target instead, and the failure is counted.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::database::Database;
use crate::error::DbError;
use crate::models::{EventFilter, SecurityEvent};
use crate::otel::SecurityMetrics;

/// Tracing target for audit records that could not be stored
pub const AUDIT_FALLBACK_TARGET: &str = "security_audit";

/// Append-only security event log
pub struct SecurityEventLogger<D: Database> {
    db: Arc<D>,
    metrics: Option<Arc<SecurityMetrics>>,
}

impl<D: Database> Clone for SecurityEventLogger<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            metrics: self.metrics.clone(),
        }
    }
}

impl<D: Database> SecurityEventLogger<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self { db, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<SecurityMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Append an event; storage failures are reported, never returned
    ///
    /// Returns the row ID when the event was stored.
    pub async fn record(&self, event: SecurityEvent) -> Option<i64> {
        match self.db.insert_security_event(&event).await {
            Ok(id) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_event(event.event_type.as_str());
                }
                tracing::debug!(
                    event_id = id,
                    event_type = %event.event_type,
                    success = event.success,
                    "Security event recorded"
                );
                Some(id)
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_audit_failure();
                }
                let json = serde_json::to_string(&event)
                    .unwrap_or_else(|_| format!("{:?}", event));
                tracing::error!(
                    target: AUDIT_FALLBACK_TARGET,
                    event = %json,
                    error = %e,
                    "Failed to persist security event"
                );
                None
            }
        }
    }

    /// Query the log, newest first
    pub async fn query(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>, DbError> {
        self.db.query_security_events(filter).await
    }

    /// Delete events older than `cutoff`
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let removed = self.db.delete_security_events_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed = removed, cutoff = %cutoff, "Purged security events past retention");
        }
        Ok(removed)
    }
}
