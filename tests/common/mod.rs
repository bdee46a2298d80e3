//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use marketplace_auth::audit::SecurityEventLogger;
use marketplace_auth::auth::{AuthService, PasswordService, RateLimiter, RegisterRequest};
use marketplace_auth::config::{
    AuthConfig, HashingConfig, LockoutConfig, MonitoringConfig, RateLimitsConfig,
};
use marketplace_auth::database::SqliteDatabase;
use marketplace_auth::models::{ClientContext, UserProfile};
use marketplace_auth::monitor::SecurityMonitor;
use marketplace_auth::notify::MemoryNotifier;
use marketplace_auth::server::AppState;

pub const GOOD_PASSWORD: &str = "Marketplace-2024!";
pub const ADMIN_PASSWORD: &str = "Admin-Secret-1";

/// Everything a test needs to drive the service and inspect its effects
pub struct TestContext {
    pub database: Arc<SqliteDatabase>,
    pub auth: Arc<AuthService<SqliteDatabase>>,
    pub monitor: Arc<SecurityMonitor<SqliteDatabase>>,
    pub notifier: Arc<MemoryNotifier>,
}

impl TestContext {
    pub fn state(&self) -> AppState<SqliteDatabase> {
        AppState {
            auth: Arc::clone(&self.auth),
            monitor: Arc::clone(&self.monitor),
            trust_forwarded_for: true,
        }
    }
}

/// Create an in-memory database for testing
pub async fn create_test_database() -> Arc<SqliteDatabase> {
    Arc::new(
        SqliteDatabase::new(":memory:")
            .await
            .expect("Failed to create test database"),
    )
}

/// Authentication policy with fast hashing and an admin password
pub fn create_test_auth_config() -> AuthConfig {
    let passwords = PasswordService::new(HashingConfig::minimum()).expect("hashing config");
    AuthConfig {
        hashing: HashingConfig::minimum(),
        admin_password_hash: Some(passwords.hash(ADMIN_PASSWORD).expect("admin hash")),
        lockout: LockoutConfig {
            threshold: 5,
            duration_secs: 900,
        },
        ..Default::default()
    }
}

/// Create a test context with the given policy and rate limits
pub async fn create_test_context_with(
    config: AuthConfig,
    limits: RateLimitsConfig,
    monitoring: MonitoringConfig,
) -> TestContext {
    let database = create_test_database().await;
    let notifier = Arc::new(MemoryNotifier::new());
    let rate_limiter = Arc::new(RateLimiter::new(limits, database.clone()));
    let auth = Arc::new(
        AuthService::new(
            Arc::clone(&database),
            config,
            rate_limiter,
            notifier.clone(),
        )
        .expect("Failed to create auth service"),
    );
    let monitor = Arc::new(SecurityMonitor::new(
        SecurityEventLogger::new(Arc::clone(&database)),
        monitoring,
    ));

    TestContext {
        database,
        auth,
        monitor,
        notifier,
    }
}

/// Create a test context with default limits and monitoring
pub async fn create_test_context() -> TestContext {
    create_test_context_with(
        create_test_auth_config(),
        RateLimitsConfig::default(),
        MonitoringConfig::default(),
    )
    .await
}

/// Client context for a given origin address
pub fn client(ip: &str) -> ClientContext {
    ClientContext::new()
        .with_ip(ip)
        .with_user_agent("integration-tests")
}

/// Pull the hex token out of a notification body
pub fn extract_token(body: &str) -> String {
    let start = body.find("token=").expect("token link in body") + "token=".len();
    body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect()
}

/// Register an account and verify its email
pub async fn register_verified(ctx: &TestContext, email: &str) -> UserProfile {
    let profile = ctx
        .auth
        .register(
            RegisterRequest {
                email: email.to_string(),
                password: GOOD_PASSWORD.to_string(),
                display_name: Some("Integration Seller".to_string()),
            },
            &client("192.0.2.1"),
        )
        .await
        .expect("registration");
    let mail = ctx
        .notifier
        .sent_to(email)
        .pop()
        .expect("verification email");
    ctx.auth
        .verify_email(&extract_token(&mail.body), &client("192.0.2.1"))
        .await
        .expect("verification");
    profile
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    state: AppState<SqliteDatabase>,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = marketplace_auth::server::build_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("Server error");
    });

    // Give the server a moment to start (100ms is sufficient for slow CI systems)
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}
