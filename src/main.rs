//! marketplace-auth - Authentication and account-security core for the marketplace
//!
//! This is the main entry point for the marketplace-auth service.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use marketplace_auth::audit::SecurityEventLogger;
use marketplace_auth::auth::{AuthService, MaintenanceTask, RateLimiter};
use marketplace_auth::config::Config;
use marketplace_auth::database::SqliteDatabase;
use marketplace_auth::monitor::SecurityMonitor;
use marketplace_auth::notify;
use marketplace_auth::otel::{init_tracing, OtelProvider, SecurityMetrics};
use marketplace_auth::server::{AppState, Server};

/// marketplace-auth - Authentication and account-security core for the marketplace
#[derive(Parser, Debug)]
#[command(name = "marketplace-auth")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "MARKETPLACE_AUTH_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting marketplace-auth"
    );

    if config.auth.admin_password_hash.is_none() {
        info!("No admin password hash configured; admin endpoints are disabled");
    }

    // Database
    let database = Arc::new(SqliteDatabase::new(&config.database.path).await?);
    info!(path = %config.database.path, "Database initialized");

    let metrics = Arc::new(SecurityMetrics::new(&otel_provider.meter()));

    // Authentication service
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limits.clone(),
        database.clone(),
    ));
    let notifier = notify::from_config(&config.notify);
    let auth = Arc::new(
        AuthService::new(
            Arc::clone(&database),
            config.auth.clone(),
            rate_limiter,
            notifier,
        )?
        .with_metrics(Arc::clone(&metrics)),
    );
    info!(
        lockout_threshold = config.auth.lockout.threshold,
        require_email_verification = config.auth.require_email_verification,
        "Authentication service initialized"
    );

    // Security monitoring
    let monitor = Arc::new(SecurityMonitor::with_metrics(
        SecurityEventLogger::new(Arc::clone(&database)).with_metrics(Arc::clone(&metrics)),
        config.monitoring.clone(),
        metrics,
    ));
    if config.monitoring.enabled {
        monitor.start().await;
    }

    // Session and rate-limit sweeping
    let (maintenance_tx, maintenance_rx) = broadcast::channel(1);
    let maintenance = MaintenanceTask::new(
        Arc::clone(&auth),
        Duration::from_secs(config.auth.session.sweep_interval_secs),
        maintenance_rx,
    );
    let maintenance_handle = tokio::spawn(maintenance.run());

    let state = AppState {
        auth,
        monitor: Arc::clone(&monitor),
        trust_forwarded_for: config.server.trust_forwarded_for,
    };

    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    // Background tasks stop after the server has drained
    monitor.stop().await;
    let _ = maintenance_tx.send(());
    if let Err(e) = maintenance_handle.await {
        error!(error = %e, "Session maintenance task failed");
    }

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("marketplace-auth shutdown complete");

    result.map_err(Into::into)
}

/// Load and validate configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => {
            // tracing is not initialized yet
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path)
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env()
        }
    }
    .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;
    Ok(config)
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
