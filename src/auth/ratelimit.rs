//! Per-operation rate limiter
//!
//! Fixed-window counters keyed by `(operation, identifier)`. Every request
//! consumes quota regardless of its outcome. Counters live in an injected
//! [`CounterStore`] so several instances can share one window table.
//!
//! Decisions made inside [`track_quota`] are collected so callers can report
//! the remaining quota back to the client.

use std::cell::Cell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{bounded_seconds, RateLimitRule, RateLimitsConfig};
use crate::error::{AuthError, DbError};

/// Counter state after an increment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Counter value after the attempt
    pub count: u32,

    /// When the current window ends
    pub window_end: DateTime<Utc>,

    /// False when the limit was already reached and nothing changed
    pub incremented: bool,
}

/// Shared store of rate-limit windows
///
/// `increment_if_below` must be atomic: two concurrent callers may never
/// both observe room for the last unit of quota.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` unless it already reached `limit`
    ///
    /// A missing or elapsed window starts fresh at one.
    async fn increment_if_below(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<WindowState, DbError>;

    /// Drop the window for `key`
    async fn reset(&self, key: &str) -> Result<(), DbError>;

    /// Delete windows that ended at or before `now`
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, DbError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    end: DateTime<Utc>,
}

/// Process-local counter store
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked windows
    pub fn len(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_if_below(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<WindowState, DbError> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        match windows.get_mut(key) {
            Some(window) if window.end > now => {
                if window.count >= limit {
                    return Ok(WindowState {
                        count: window.count,
                        window_end: window.end,
                        incremented: false,
                    });
                }
                window.count += 1;
                Ok(WindowState {
                    count: window.count,
                    window_end: window.end,
                    incremented: true,
                })
            }
            _ => {
                let end = now + bounded_seconds(window_secs);
                windows.insert(key.to_string(), Window { count: 1, end });
                Ok(WindowState {
                    count: 1,
                    window_end: end,
                    incremented: true,
                })
            }
        }
    }

    async fn reset(&self, key: &str) -> Result<(), DbError> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, window| window.end > now);
        Ok((before - windows.len()) as u64)
    }
}

/// Rate-limited operations; each has its own counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitOperation {
    /// Login attempts per client address
    LoginIp,
    /// Login attempts per email
    LoginAccount,
    /// Registrations per client address
    Register,
    /// Password reset requests per email
    PasswordReset,
    /// Password reset requests per client address
    PasswordResetIp,
    /// Password reset completions per client address
    PasswordResetComplete,
    /// Password change attempts per account
    PasswordChange,
    /// Verification email resends per email
    VerificationResend,
    /// Administrative authentication per client address
    AdminAuth,
}

impl RateLimitOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitOperation::LoginIp => "login_ip",
            RateLimitOperation::LoginAccount => "login_account",
            RateLimitOperation::Register => "register",
            RateLimitOperation::PasswordReset => "password_reset",
            RateLimitOperation::PasswordResetIp => "password_reset_ip",
            RateLimitOperation::PasswordResetComplete => "password_reset_complete",
            RateLimitOperation::PasswordChange => "password_change",
            RateLimitOperation::VerificationResend => "verification_resend",
            RateLimitOperation::AdminAuth => "admin_auth",
        }
    }
}

impl std::fmt::Display for RateLimitOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Seconds until the window resets, at least one
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }

    /// Error to return for a rejected request
    pub fn into_error(self) -> AuthError {
        AuthError::RateLimitExceeded {
            limit: self.limit,
            retry_after_secs: self.retry_after_secs(Utc::now()),
            reset_at: self.reset_at,
        }
    }
}

tokio::task_local! {
    static QUOTA: Cell<Option<RateLimitDecision>>;
}

/// Run `future`, returning the tightest decision the limiter made meanwhile
pub async fn track_quota<F: Future>(future: F) -> (F::Output, Option<RateLimitDecision>) {
    QUOTA
        .scope(Cell::new(None), async move {
            let output = future.await;
            (output, QUOTA.with(Cell::take))
        })
        .await
}

fn report_quota(decision: RateLimitDecision) {
    let _ = QUOTA.try_with(|slot| match slot.get() {
        Some(current) if current.remaining < decision.remaining => {}
        _ => slot.set(Some(decision)),
    });
}

/// Rate limiter over a shared counter store
pub struct RateLimiter {
    config: RateLimitsConfig,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitsConfig, store: Arc<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    /// Rate limiter with default rules and a process-local store
    pub fn in_memory() -> Self {
        Self::new(
            RateLimitsConfig::default(),
            Arc::new(InMemoryCounterStore::new()),
        )
    }

    /// The configured rule for `operation`
    pub fn rule(&self, operation: RateLimitOperation) -> RateLimitRule {
        match operation {
            RateLimitOperation::LoginIp => self.config.login_ip,
            RateLimitOperation::LoginAccount => self.config.login_account,
            RateLimitOperation::Register => self.config.register,
            RateLimitOperation::PasswordReset => self.config.password_reset,
            RateLimitOperation::PasswordResetIp => self.config.password_reset_ip,
            RateLimitOperation::PasswordResetComplete => self.config.password_reset_complete,
            RateLimitOperation::PasswordChange => self.config.password_change,
            RateLimitOperation::VerificationResend => self.config.verification_resend,
            RateLimitOperation::AdminAuth => self.config.admin_auth,
        }
    }

    /// Consume one unit of quota for `(operation, identifier)`
    pub async fn check(
        &self,
        operation: RateLimitOperation,
        identifier: &str,
    ) -> Result<RateLimitDecision, DbError> {
        self.check_at(operation, identifier, Utc::now()).await
    }

    /// Same as [`check`](Self::check) at an explicit time
    pub async fn check_at(
        &self,
        operation: RateLimitOperation,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, DbError> {
        let rule = self.rule(operation);
        let key = window_key(operation, identifier);

        let state = self
            .store
            .increment_if_below(&key, rule.limit, rule.window_secs, now)
            .await?;

        let decision = RateLimitDecision {
            allowed: state.incremented,
            limit: rule.limit,
            remaining: rule.limit.saturating_sub(state.count),
            reset_at: state.window_end,
        };

        report_quota(decision);

        if !decision.allowed {
            tracing::warn!(
                operation = %operation,
                limit = rule.limit,
                reset_at = %decision.reset_at,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Clear the window for `(operation, identifier)`
    pub async fn reset(
        &self,
        operation: RateLimitOperation,
        identifier: &str,
    ) -> Result<(), DbError> {
        self.store.reset(&window_key(operation, identifier)).await
    }

    /// Delete elapsed windows
    pub async fn sweep_expired(&self) -> Result<u64, DbError> {
        self.store.sweep_expired(Utc::now()).await
    }
}

/// Store key for an operation and identifier; identifiers are case-folded
fn window_key(operation: RateLimitOperation, identifier: &str) -> String {
    format!("{}:{}", operation.as_str(), identifier.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn limiter_with(rule: RateLimitRule) -> RateLimiter {
        let config = RateLimitsConfig {
            login_ip: rule,
            login_account: rule,
            ..Default::default()
        };
        RateLimiter::new(config, Arc::new(InMemoryCounterStore::new()))
    }

    // Test 1: The fourth check within a 3-per-window limit is rejected
    #[tokio::test]
    async fn test_limit_reached() {
        let limiter = limiter_with(RateLimitRule::new(3, 60));
        let now = Utc::now();

        for remaining in [2, 1, 0] {
            let decision = limiter
                .check_at(RateLimitOperation::LoginIp, "10.0.0.1", now)
                .await
                .unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, remaining);
            assert_eq!(decision.limit, 3);
        }

        let decision = limiter
            .check_at(RateLimitOperation::LoginIp, "10.0.0.1", now)
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    // Test 2: The window resets after it elapses
    #[tokio::test]
    async fn test_window_reset() {
        let limiter = limiter_with(RateLimitRule::new(3, 60));
        let now = Utc::now();

        for _ in 0..4 {
            limiter
                .check_at(RateLimitOperation::LoginIp, "10.0.0.1", now)
                .await
                .unwrap();
        }

        let later = now + Duration::seconds(60);
        let decision = limiter
            .check_at(RateLimitOperation::LoginIp, "10.0.0.1", later)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, later + Duration::seconds(60));
    }

    // Test 3: Operations and identifiers do not share counters
    #[tokio::test]
    async fn test_independent_counters() {
        let limiter = limiter_with(RateLimitRule::new(1, 60));
        let now = Utc::now();

        assert!(limiter
            .check_at(RateLimitOperation::LoginIp, "a", now)
            .await
            .unwrap()
            .allowed);
        assert!(limiter
            .check_at(RateLimitOperation::LoginAccount, "a", now)
            .await
            .unwrap()
            .allowed);
        assert!(limiter
            .check_at(RateLimitOperation::LoginIp, "b", now)
            .await
            .unwrap()
            .allowed);
        assert!(!limiter
            .check_at(RateLimitOperation::LoginIp, "a", now)
            .await
            .unwrap()
            .allowed);
    }

    // Test 4: Email identifiers are case-insensitive
    #[tokio::test]
    async fn test_identifier_case_folded() {
        let limiter = limiter_with(RateLimitRule::new(1, 60));
        let now = Utc::now();

        limiter
            .check_at(RateLimitOperation::LoginAccount, "User@Example.com", now)
            .await
            .unwrap();
        let decision = limiter
            .check_at(RateLimitOperation::LoginAccount, "user@example.com ", now)
            .await
            .unwrap();
        assert!(!decision.allowed);
    }

    // Test 5: Reset clears the window
    #[tokio::test]
    async fn test_reset() {
        let limiter = limiter_with(RateLimitRule::new(1, 60));
        let now = Utc::now();

        limiter
            .check_at(RateLimitOperation::LoginAccount, "a@example.com", now)
            .await
            .unwrap();
        limiter
            .reset(RateLimitOperation::LoginAccount, "a@example.com")
            .await
            .unwrap();
        assert!(limiter
            .check_at(RateLimitOperation::LoginAccount, "a@example.com", now)
            .await
            .unwrap()
            .allowed);
    }

    // Test 6: Concurrent checks never exceed the limit
    #[tokio::test]
    async fn test_concurrent_checks_respect_limit() {
        let limiter = Arc::new(limiter_with(RateLimitRule::new(5, 60)));
        let mut handles = Vec::new();

        for _ in 0..50 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter
                    .check(RateLimitOperation::LoginIp, "203.0.113.5")
                    .await
                    .unwrap()
                    .allowed
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    // Test 7: Sweep drops only elapsed windows
    #[tokio::test]
    async fn test_in_memory_sweep() {
        let store = InMemoryCounterStore::new();
        let now = Utc::now();

        store.increment_if_below("short", 5, 10, now).await.unwrap();
        store.increment_if_below("long", 5, 600, now).await.unwrap();
        assert_eq!(store.len(), 2);

        let swept = store
            .sweep_expired(now + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(swept, 1);
        assert_eq!(store.len(), 1);
    }

    // Test 8: Store errors propagate
    #[tokio::test]
    async fn test_store_error_propagates() {
        let mut store = MockCounterStore::new();
        store
            .expect_increment_if_below()
            .returning(|_, _, _, _| Err(DbError::NotFound));

        let limiter = RateLimiter::new(RateLimitsConfig::default(), Arc::new(store));
        let result = limiter.check(RateLimitOperation::Register, "1.2.3.4").await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }

    // Test 9: Rejected decision converts to a rate-limit error
    #[test]
    fn test_decision_into_error() {
        let reset_at = Utc::now() + Duration::seconds(30);
        let decision = RateLimitDecision {
            allowed: false,
            limit: 3,
            remaining: 0,
            reset_at,
        };

        match decision.into_error() {
            AuthError::RateLimitExceeded {
                limit,
                retry_after_secs,
                reset_at: at,
            } => {
                assert_eq!(limit, 3);
                assert!(retry_after_secs >= 29 && retry_after_secs <= 30);
                assert_eq!(at, reset_at);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    // Test 10: Operation names match the configuration keys
    #[test]
    fn test_operation_names_match_config() {
        let config = RateLimitsConfig::default();
        let names: Vec<&str> = config.rules().iter().map(|(name, _)| *name).collect();
        for op in [
            RateLimitOperation::LoginIp,
            RateLimitOperation::LoginAccount,
            RateLimitOperation::Register,
            RateLimitOperation::PasswordReset,
            RateLimitOperation::PasswordResetIp,
            RateLimitOperation::PasswordResetComplete,
            RateLimitOperation::PasswordChange,
            RateLimitOperation::VerificationResend,
            RateLimitOperation::AdminAuth,
        ] {
            assert!(names.contains(&op.as_str()));
        }
    }

    // Test 11: An oversized window saturates instead of overflowing
    #[tokio::test]
    async fn test_oversized_window_saturates() {
        let limiter = limiter_with(RateLimitRule::new(5, u64::MAX / 2));
        let now = Utc::now();

        let decision = limiter
            .check_at(RateLimitOperation::LoginIp, "203.0.113.1", now)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(
            decision.reset_at,
            now + Duration::seconds(crate::config::MAX_DURATION_SECS as i64)
        );
    }

    // Test 12: Tracked checks report the tightest remaining quota
    #[tokio::test]
    async fn test_track_quota_reports_tightest() {
        let config = RateLimitsConfig {
            login_ip: RateLimitRule::new(5, 60),
            login_account: RateLimitRule::new(2, 60),
            ..Default::default()
        };
        let limiter = RateLimiter::new(config, Arc::new(InMemoryCounterStore::new()));

        let (_, decision) = track_quota(async {
            limiter
                .check(RateLimitOperation::LoginIp, "203.0.113.1")
                .await
                .unwrap();
            limiter
                .check(RateLimitOperation::LoginAccount, "a@example.com")
                .await
                .unwrap();
        })
        .await;
        let decision = decision.unwrap();
        assert_eq!(decision.limit, 2);
        assert_eq!(decision.remaining, 1);

        // Untracked checks still count
        let untracked = limiter
            .check(RateLimitOperation::LoginIp, "203.0.113.1")
            .await
            .unwrap();
        assert_eq!(untracked.remaining, 3);

        let (_, nothing) = track_quota(async {}).await;
        assert!(nothing.is_none());
    }
}
