//! Security monitoring integration tests
//!
//! Feeds real authentication traffic into the event log and checks the
//! alerts the monitor raises from it.

mod common;

use common::*;
use marketplace_auth::auth::LoginRequest;
use marketplace_auth::config::Threshold;
use marketplace_auth::models::{AlertKind, EventFilter, SecurityEventType, Severity};

fn login(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

async fn fail_logins(ctx: &TestContext, email: &str, ip: &str, count: usize) {
    for _ in 0..count {
        let _ = ctx
            .auth
            .login(login(email, "Wrong-Password-9"), &client(ip))
            .await;
    }
}

/// Test 1: Repeated failures on one account raise a single alert
#[tokio::test]
async fn test_account_failures_raise_alert() {
    let ctx = create_test_context().await;
    register_verified(&ctx, "victim@example.com").await;
    fail_logins(&ctx, "victim@example.com", "198.51.100.9", 5).await;

    let report = ctx.monitor.run_now().await.unwrap();
    assert_eq!(report.alerts_raised, 1);

    let alerts = ctx.monitor.active_alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::CredentialStuffing);
    assert_eq!(alerts[0].severity, Severity::Medium);
    assert_eq!(alerts[0].subject, "victim@example.com");
    assert_eq!(alerts[0].event_count, 5);

    let suspicious = ctx
        .auth
        .audit()
        .query(&EventFilter::new().with_type(SecurityEventType::SuspiciousActivity))
        .await
        .unwrap();
    assert_eq!(suspicious.len(), 1);
    assert_eq!(suspicious[0].email.as_deref(), Some("victim@example.com"));
    assert_eq!(suspicious[0].details["alertId"], alerts[0].id.as_str());

    // Re-running over the same events does not duplicate the alert
    let report = ctx.monitor.run_now().await.unwrap();
    assert_eq!(report.alerts_raised, 0);
    assert_eq!(ctx.monitor.active_alerts().await.len(), 1);
}

/// Test 2: Acknowledged alerts stay quiet until new activity
#[tokio::test]
async fn test_acknowledged_alert_requires_new_activity() {
    let ctx = create_test_context().await;
    let profile = register_verified(&ctx, "ack@example.com").await;
    fail_logins(&ctx, "ack@example.com", "198.51.100.10", 5).await;

    ctx.monitor.run_now().await.unwrap();
    let alert = ctx.monitor.active_alerts().await.pop().unwrap();

    let acknowledged = ctx.monitor.acknowledge(&alert.id, "oncall").await.unwrap();
    assert_eq!(acknowledged.acknowledged_by.as_deref(), Some("oncall"));
    assert!(ctx.monitor.active_alerts().await.is_empty());

    let report = ctx.monitor.run_now().await.unwrap();
    assert_eq!(report.alerts_raised, 0);

    ctx.auth
        .unlock_account(profile.id, "oncall", &client("192.0.2.200"))
        .await
        .unwrap();
    fail_logins(&ctx, "ack@example.com", "198.51.100.11", 5).await;

    let report = ctx.monitor.run_now().await.unwrap();
    assert_eq!(report.alerts_raised, 1);
    let active = ctx.monitor.active_alerts().await;
    assert_eq!(active.len(), 1);
    assert_ne!(active[0].id, alert.id);
    assert_eq!(active[0].event_count, 5);
}

/// Test 3: Failures spread over many accounts are attributed to the address
#[tokio::test]
async fn test_spread_failures_raise_address_alert() {
    let ctx = create_test_context().await;
    for i in 0..10 {
        fail_logins(&ctx, &format!("scan{}@example.com", i), "203.0.113.66", 1).await;
    }

    let report = ctx.monitor.run_now().await.unwrap();
    assert_eq!(report.alerts_raised, 1);

    let alerts = ctx.monitor.active_alerts().await;
    assert_eq!(alerts[0].kind, AlertKind::FailedLoginSpike);
    assert_eq!(alerts[0].severity, Severity::High);
    assert_eq!(alerts[0].subject, "203.0.113.66");
    assert_eq!(alerts[0].event_count, 10);
}

/// Test 4: Lowered thresholds take effect on the next cycle
#[tokio::test]
async fn test_threshold_update_applies_next_cycle() {
    let ctx = create_test_context().await;
    for i in 0..3 {
        fail_logins(&ctx, &format!("scan{}@example.com", i), "203.0.113.67", 1).await;
    }

    assert_eq!(ctx.monitor.run_now().await.unwrap().alerts_raised, 0);

    let previous = ctx
        .monitor
        .update_threshold("failed_logins_per_ip", Threshold::new(3, 15))
        .await
        .unwrap();
    assert_eq!(previous, Threshold::new(10, 15));
    assert_eq!(
        ctx.monitor.status().await.thresholds.failed_logins_per_ip,
        Threshold::new(3, 15)
    );

    assert_eq!(ctx.monitor.run_now().await.unwrap().alerts_raised, 1);
}

/// Test 5: Start and stop are idempotent
#[tokio::test]
async fn test_scheduler_start_stop() {
    let ctx = create_test_context().await;

    assert!(ctx.monitor.start().await);
    assert!(!ctx.monitor.start().await);
    assert!(ctx.monitor.status().await.running);

    assert!(ctx.monitor.stop().await);
    assert!(!ctx.monitor.stop().await);
    assert!(!ctx.monitor.status().await.running);

    let report = ctx.monitor.run_now().await.unwrap();
    assert_eq!(report.alerts_raised, 0);
    assert_eq!(ctx.monitor.status().await.cycles_completed, 1);
}
