//! Security monitoring scheduler
//!
//! This module provides a supervised background task that periodically
//! scans the security event log against the configured thresholds and
//! keeps the resulting alerts in memory.
//!
//! All control operations are idempotent. [`SecurityMonitor::stop`] lets an
//! in-flight cycle finish before returning, and a manual
//! [`SecurityMonitor::run_now`] never overlaps with a scheduled cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::audit::SecurityEventLogger;
use crate::config::{
    MonitoringConfig, MonitoringThresholds, Threshold, MAX_RETENTION_DAYS, MAX_WINDOW_MINUTES,
};
use crate::database::Database;
use crate::error::MonitorError;
use crate::models::{Alert, AlertKind, SecurityEvent, SecurityEventType};
use crate::otel::SecurityMetrics;

use super::rules::{evaluate, Finding, Rule};

/// Scheduler state exposed to administrators
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub interval_minutes: u64,
    pub retention_days: u32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub cycles_completed: u64,
    pub active_alerts: usize,
    pub thresholds: MonitoringThresholds,
}

/// Outcome of one monitoring cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub alerts_raised: usize,
    pub alerts_updated: usize,
    pub events_purged: u64,
}

#[derive(Default)]
struct MonitorState {
    config: MonitoringConfig,
    alerts: HashMap<String, Alert>,
    /// Last acknowledgement time per (kind, subject)
    acknowledged: HashMap<(AlertKind, String), DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
    last_run_duration_ms: Option<u64>,
    last_error: Option<String>,
    cycles_completed: u64,
}

struct Inner<D: Database> {
    audit: SecurityEventLogger<D>,
    state: RwLock<MonitorState>,
    cycle_lock: Mutex<()>,
    metrics: Option<Arc<SecurityMetrics>>,
}

struct Running {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic threshold monitor over the security event log
pub struct SecurityMonitor<D: Database> {
    inner: Arc<Inner<D>>,
    running: Mutex<Option<Running>>,
}

impl<D: Database + 'static> SecurityMonitor<D> {
    pub fn new(audit: SecurityEventLogger<D>, config: MonitoringConfig) -> Self {
        Self::build(audit, config, None)
    }

    /// Create a monitor that counts raised alerts into `metrics`
    pub fn with_metrics(
        audit: SecurityEventLogger<D>,
        config: MonitoringConfig,
        metrics: Arc<SecurityMetrics>,
    ) -> Self {
        Self::build(audit, config, Some(metrics))
    }

    fn build(
        audit: SecurityEventLogger<D>,
        config: MonitoringConfig,
        metrics: Option<Arc<SecurityMetrics>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                audit,
                state: RwLock::new(MonitorState {
                    config,
                    ..Default::default()
                }),
                cycle_lock: Mutex::new(()),
                metrics,
            }),
            running: Mutex::new(None),
        }
    }

    /// Start periodic cycles; returns false if already running
    pub async fn start(&self) -> bool {
        let interval_minutes = self.inner.state.read().await.config.interval_minutes.max(1);
        let started = self
            .start_every(Duration::from_secs(interval_minutes.saturating_mul(60)))
            .await;
        if started {
            info!(interval_minutes = interval_minutes, "Security monitor started");
        }
        started
    }

    async fn start_every(&self, interval: Duration) -> bool {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                debug!("Security monitor already running");
                return false;
            }
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            Inner::run_loop(inner, interval, shutdown_rx).await;
        });
        *running = Some(Running {
            shutdown_tx,
            handle,
        });
        true
    }

    /// Stop periodic cycles, waiting for an in-flight cycle; false if not running
    pub async fn stop(&self) -> bool {
        let Some(current) = self.running.lock().await.take() else {
            return false;
        };

        let _ = current.shutdown_tx.send(());
        if let Err(e) = current.handle.await {
            error!(error = %e, "Security monitor task ended abnormally");
        }

        info!("Security monitor stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.running.lock().await.as_ref(), Some(r) if !r.handle.is_finished())
    }

    /// Run one cycle immediately
    pub async fn run_now(&self) -> Result<CycleReport, MonitorError> {
        self.inner.run_cycle().await
    }

    /// Unacknowledged alerts, newest first
    pub async fn active_alerts(&self) -> Vec<Alert> {
        let state = self.inner.state.read().await;
        let mut alerts: Vec<Alert> = state
            .alerts
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        alerts
    }

    /// Every retained alert, newest first
    pub async fn alerts(&self) -> Vec<Alert> {
        let state = self.inner.state.read().await;
        let mut alerts: Vec<Alert> = state.alerts.values().cloned().collect();
        alerts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        alerts
    }

    /// Acknowledge an alert
    ///
    /// Events up to now no longer count toward a new alert for the same
    /// kind and subject.
    pub async fn acknowledge(&self, id: &str, by: &str) -> Result<Alert, MonitorError> {
        let mut state = self.inner.state.write().await;
        let now = Utc::now();

        let alert = state
            .alerts
            .get_mut(id)
            .ok_or_else(|| MonitorError::AlertNotFound(id.to_string()))?;

        if alert.acknowledged_at.is_none() {
            alert.acknowledged_at = Some(now);
            alert.acknowledged_by = Some(by.to_string());
            alert.updated_at = now;
        }
        let alert = alert.clone();

        let acked_at = alert.acknowledged_at.unwrap_or(now);
        state
            .acknowledged
            .insert((alert.kind, alert.subject.clone()), acked_at);

        info!(alert_id = %alert.id, kind = %alert.kind, acknowledged_by = %by, "Alert acknowledged");
        Ok(alert)
    }

    /// Replace one threshold by name, returning the previous value
    pub async fn update_threshold(
        &self,
        name: &str,
        threshold: Threshold,
    ) -> Result<Threshold, MonitorError> {
        if !threshold.is_valid() {
            return Err(MonitorError::InvalidThreshold(format!(
                "{}: count must be at least 1 and window between 1 and {} minutes",
                name, MAX_WINDOW_MINUTES
            )));
        }

        let mut state = self.inner.state.write().await;
        let slot = threshold_slot(&mut state.config.thresholds, name)
            .ok_or_else(|| MonitorError::InvalidThreshold(format!("unknown threshold {}", name)))?;
        let previous = std::mem::replace(slot, threshold);

        info!(
            threshold = name,
            count = threshold.count,
            window_minutes = threshold.window_minutes,
            "Monitoring threshold updated"
        );
        Ok(previous)
    }

    pub async fn status(&self) -> MonitorStatus {
        let running = self.is_running().await;
        let state = self.inner.state.read().await;
        MonitorStatus {
            running,
            interval_minutes: state.config.interval_minutes,
            retention_days: state.config.retention_days,
            last_run_at: state.last_run_at,
            last_run_duration_ms: state.last_run_duration_ms,
            last_error: state.last_error.clone(),
            cycles_completed: state.cycles_completed,
            active_alerts: state.alerts.values().filter(|a| a.is_active()).count(),
            thresholds: state.config.thresholds.clone(),
        }
    }
}

fn threshold_slot<'a>(
    thresholds: &'a mut MonitoringThresholds,
    name: &str,
) -> Option<&'a mut Threshold> {
    match name {
        "failed_logins_per_ip" => Some(&mut thresholds.failed_logins_per_ip),
        "failed_logins_per_account" => Some(&mut thresholds.failed_logins_per_account),
        "account_lockouts" => Some(&mut thresholds.account_lockouts),
        "password_resets_per_ip" => Some(&mut thresholds.password_resets_per_ip),
        "ip_velocity" => Some(&mut thresholds.ip_velocity),
        _ => None,
    }
}

impl<D: Database + 'static> Inner<D> {
    async fn run_loop(inner: Arc<Self>, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut timer = interval_at(Instant::now() + interval, interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    debug!("Security monitor loop shutting down");
                    break;
                }
                _ = timer.tick() => {
                    if let Err(e) = inner.run_cycle().await {
                        warn!(error = %e, "Monitoring cycle failed");
                    }
                }
            }
        }
    }

    async fn run_cycle(&self) -> Result<CycleReport, MonitorError> {
        let _guard = self.cycle_lock.lock().await;
        let started = std::time::Instant::now();
        let now = Utc::now();

        let result = self.evaluate_rules(now).await;

        let mut state = self.state.write().await;
        state.last_run_at = Some(now);
        state.last_run_duration_ms = Some(started.elapsed().as_millis() as u64);
        state.cycles_completed += 1;
        match &result {
            Ok(report) => {
                state.last_error = None;
                debug!(
                    alerts_raised = report.alerts_raised,
                    alerts_updated = report.alerts_updated,
                    events_purged = report.events_purged,
                    "Monitoring cycle completed"
                );
            }
            Err(e) => state.last_error = Some(e.to_string()),
        }
        result
    }

    async fn evaluate_rules(&self, now: DateTime<Utc>) -> Result<CycleReport, MonitorError> {
        let (thresholds, retention_days) = {
            let state = self.state.read().await;
            (state.config.thresholds.clone(), state.config.retention_days)
        };

        let mut findings: Vec<Finding> = Vec::new();
        for (name, threshold) in thresholds.entries() {
            let Some(rule) = Rule::by_name(name) else {
                continue;
            };
            findings.extend(self.evaluate_rule(rule, threshold, now).await?);
        }

        let mut report = CycleReport::default();
        let mut raised = Vec::new();
        {
            let mut state = self.state.write().await;
            for finding in findings {
                let existing = state
                    .alerts
                    .values_mut()
                    .find(|a| a.is_active() && a.kind == finding.kind && a.subject == finding.subject);

                match existing {
                    Some(alert) => {
                        if alert.event_count != finding.event_count || alert.last_seen != finding.last_seen {
                            alert.event_count = finding.event_count;
                            alert.last_seen = finding.last_seen;
                            alert.threshold = finding.threshold;
                            alert.updated_at = now;
                            report.alerts_updated += 1;
                        }
                    }
                    None => {
                        let alert = Alert {
                            id: uuid::Uuid::new_v4().to_string(),
                            kind: finding.kind,
                            severity: finding.severity,
                            subject: finding.subject,
                            event_count: finding.event_count,
                            threshold: finding.threshold,
                            window_minutes: finding.window_minutes,
                            first_seen: finding.first_seen,
                            last_seen: finding.last_seen,
                            created_at: now,
                            updated_at: now,
                            acknowledged_at: None,
                            acknowledged_by: None,
                        };
                        state.alerts.insert(alert.id.clone(), alert.clone());
                        raised.push(alert);
                    }
                }
            }

            let cutoff = now - chrono::Duration::days(i64::from(retention_days.min(MAX_RETENTION_DAYS)));
            state
                .alerts
                .retain(|_, a| a.acknowledged_at.map_or(true, |at| at > cutoff));
            state.acknowledged.retain(|_, at| *at > cutoff);
        }

        report.alerts_raised = raised.len();
        for alert in raised {
            self.announce(&alert).await;
        }

        let cutoff = now - chrono::Duration::days(i64::from(retention_days.min(MAX_RETENTION_DAYS)));
        report.events_purged = match self.audit.purge_older_than(cutoff).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Security event retention purge failed");
                0
            }
        };

        Ok(report)
    }

    async fn evaluate_rule(
        &self,
        rule: &Rule,
        threshold: Threshold,
        now: DateTime<Utc>,
    ) -> Result<Vec<Finding>, MonitorError> {
        let events = self.audit.query(&rule.filter(threshold, now)).await?;
        let acknowledged: HashMap<String, DateTime<Utc>> = {
            let state = self.state.read().await;
            state
                .acknowledged
                .iter()
                .filter(|((kind, _), _)| *kind == rule.kind)
                .map(|((_, subject), at)| (subject.clone(), *at))
                .collect()
        };
        Ok(evaluate(rule, threshold, &events, &acknowledged))
    }

    /// Log and record a newly raised alert
    async fn announce(&self, alert: &Alert) {
        warn!(
            alert_id = %alert.id,
            kind = %alert.kind,
            subject = %alert.subject,
            event_count = alert.event_count,
            threshold = alert.threshold,
            "Security alert raised"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_alert(alert.kind.as_str());
        }

        let mut event = SecurityEvent::new(SecurityEventType::SuspiciousActivity, false)
            .with_details(json!({
                "alertId": alert.id,
                "kind": alert.kind,
                "severity": alert.severity,
                "subject": alert.subject,
                "eventCount": alert.event_count,
                "threshold": alert.threshold,
                "windowMinutes": alert.window_minutes,
            }));
        if let Ok(user_id) = alert.subject.parse::<i64>() {
            event = event.with_user(user_id);
        } else if alert.subject.contains('@') {
            event = event.with_email(alert.subject.as_str());
        }
        self.audit.record(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MockDatabase, SqliteDatabase};
    use crate::models::{ClientContext, EventFilter};

    async fn monitor_with_db() -> (Arc<SqliteDatabase>, SecurityMonitor<SqliteDatabase>) {
        let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        let audit = SecurityEventLogger::new(Arc::clone(&db));
        let monitor = SecurityMonitor::new(audit, MonitoringConfig::default());
        (db, monitor)
    }

    fn idle_mock() -> MockDatabase {
        let mut mock = MockDatabase::new();
        mock.expect_query_security_events().returning(|_| Ok(vec![]));
        mock.expect_delete_security_events_before()
            .returning(|_| Ok(0));
        mock
    }

    async fn record_failed_logins(db: &Arc<SqliteDatabase>, ip: &str, count: usize) {
        let audit = SecurityEventLogger::new(Arc::clone(db));
        for i in 0..count {
            audit
                .record(
                    SecurityEvent::new(SecurityEventType::LoginAttempt, false)
                        .with_email(format!("victim{}@example.com", i))
                        .with_context(&ClientContext::new().with_ip(ip)),
                )
                .await;
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    // Test 1: Failed-login spike raises one deduplicated alert
    #[tokio::test]
    async fn test_run_now_raises_and_dedupes() {
        let (db, monitor) = monitor_with_db().await;
        record_failed_logins(&db, "198.51.100.7", 10).await;

        let report = monitor.run_now().await.unwrap();
        assert_eq!(report.alerts_raised, 1);

        let alerts = monitor.active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::FailedLoginSpike);
        assert_eq!(alerts[0].subject, "198.51.100.7");
        assert_eq!(alerts[0].event_count, 10);

        record_failed_logins(&db, "198.51.100.7", 2).await;
        let report = monitor.run_now().await.unwrap();
        assert_eq!(report.alerts_raised, 0);
        assert_eq!(report.alerts_updated, 1);

        let alerts = monitor.active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].event_count, 12);
    }

    // Test 2: New alert is written to the event log
    #[tokio::test]
    async fn test_alert_logs_suspicious_activity() {
        let (db, monitor) = monitor_with_db().await;
        record_failed_logins(&db, "198.51.100.7", 10).await;
        monitor.run_now().await.unwrap();

        let events = db
            .query_security_events(
                &EventFilter::new().with_type(SecurityEventType::SuspiciousActivity),
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details["kind"], "failed_login_spike");
        assert_eq!(events[0].details["subject"], "198.51.100.7");
    }

    // Test 3: Acknowledged alert is not re-raised from the same events
    #[tokio::test]
    async fn test_acknowledge() {
        let (db, monitor) = monitor_with_db().await;
        record_failed_logins(&db, "198.51.100.7", 10).await;
        monitor.run_now().await.unwrap();

        let id = monitor.active_alerts().await[0].id.clone();
        let acked = monitor.acknowledge(&id, "ops").await.unwrap();
        assert_eq!(acked.acknowledged_by.as_deref(), Some("ops"));
        assert!(monitor.active_alerts().await.is_empty());

        let report = monitor.run_now().await.unwrap();
        assert_eq!(report.alerts_raised, 0);
        assert!(monitor.active_alerts().await.is_empty());
        assert_eq!(monitor.alerts().await.len(), 1);
    }

    // Test 4: Unknown alert id is reported
    #[tokio::test]
    async fn test_acknowledge_unknown() {
        let (_db, monitor) = monitor_with_db().await;
        let err = monitor.acknowledge("missing", "ops").await.unwrap_err();
        assert!(matches!(err, MonitorError::AlertNotFound(id) if id == "missing"));
    }

    // Test 5: Thresholds can be tightened at runtime
    #[tokio::test]
    async fn test_update_threshold() {
        let (db, monitor) = monitor_with_db().await;
        record_failed_logins(&db, "198.51.100.7", 3).await;
        assert_eq!(monitor.run_now().await.unwrap().alerts_raised, 0);

        let previous = monitor
            .update_threshold("failed_logins_per_ip", Threshold::new(3, 15))
            .await
            .unwrap();
        assert_eq!(previous, Threshold::new(10, 15));
        assert_eq!(monitor.run_now().await.unwrap().alerts_raised, 1);

        assert!(matches!(
            monitor.update_threshold("nope", Threshold::new(1, 1)).await,
            Err(MonitorError::InvalidThreshold(_))
        ));
        assert!(matches!(
            monitor
                .update_threshold("ip_velocity", Threshold::new(0, 1))
                .await,
            Err(MonitorError::InvalidThreshold(_))
        ));
    }

    // Test 6: Start and stop are idempotent
    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let monitor = SecurityMonitor::new(
            SecurityEventLogger::new(Arc::new(idle_mock())),
            MonitoringConfig::default(),
        );

        assert!(!monitor.stop().await);
        assert!(monitor.start().await);
        assert!(!monitor.start().await);
        assert!(monitor.is_running().await);
        assert!(monitor.stop().await);
        assert!(!monitor.stop().await);
        assert!(!monitor.status().await.running);
    }

    // Test 7: Cycles run on the configured interval
    #[tokio::test]
    async fn test_cycles_follow_interval() {
        tokio::time::pause();

        let config = MonitoringConfig {
            interval_minutes: 5,
            ..Default::default()
        };
        let monitor =
            SecurityMonitor::new(SecurityEventLogger::new(Arc::new(idle_mock())), config);
        monitor.start().await;
        settle().await;
        assert_eq!(monitor.status().await.cycles_completed, 0);

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        settle().await;
        assert_eq!(monitor.status().await.cycles_completed, 1);

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        settle().await;
        assert_eq!(monitor.status().await.cycles_completed, 2);

        monitor.stop().await;
    }

    // Test 8: Storage failure is reported in status
    #[tokio::test]
    async fn test_cycle_storage_failure() {
        let mut mock = MockDatabase::new();
        mock.expect_query_security_events()
            .returning(|_| Err(crate::error::DbError::ConstraintViolation("locked".into())));

        let monitor = SecurityMonitor::new(
            SecurityEventLogger::new(Arc::new(mock)),
            MonitoringConfig::default(),
        );
        assert!(matches!(
            monitor.run_now().await,
            Err(MonitorError::Storage(_))
        ));

        let status = monitor.status().await;
        assert_eq!(status.cycles_completed, 1);
        assert!(status.last_error.is_some());
    }

    // Test 9: Each cycle purges events past retention
    #[tokio::test]
    async fn test_cycle_purges_retention() {
        let (db, monitor) = monitor_with_db().await;
        let audit = SecurityEventLogger::new(Arc::clone(&db));
        audit
            .record(
                SecurityEvent::new(SecurityEventType::TokenUsed, true)
                    .at(Utc::now() - chrono::Duration::days(120)),
            )
            .await;

        let report = monitor.run_now().await.unwrap();
        assert_eq!(report.events_purged, 1);
    }

    // Test 10: Stop waits for an in-flight cycle to finish
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_waits_for_in_flight_cycle() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let mut mock = MockDatabase::new();
        mock.expect_query_security_events().returning(move |_| {
            let _ = entered_tx.send(());
            // Blocks until the sender is dropped
            let _ = release_rx.recv();
            Ok(vec![])
        });
        mock.expect_delete_security_events_before()
            .returning(|_| Ok(0));

        let monitor = Arc::new(SecurityMonitor::new(
            SecurityEventLogger::new(Arc::new(mock)),
            MonitoringConfig::default(),
        ));
        assert!(monitor.start_every(Duration::from_millis(10)).await);

        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .expect("cycle started");

        let stopper = tokio::spawn({
            let monitor = Arc::clone(&monitor);
            async move { monitor.stop().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stopper.is_finished());
        assert_eq!(monitor.status().await.cycles_completed, 0);

        drop(release_tx);
        let stopped = tokio::time::timeout(Duration::from_secs(5), stopper)
            .await
            .expect("stop returned")
            .unwrap();
        assert!(stopped);

        let status = monitor.status().await;
        assert_eq!(status.cycles_completed, 1);
        assert!(!status.running);
    }
}
