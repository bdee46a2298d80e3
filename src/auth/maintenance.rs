//! Periodic cleanup of expired sessions and rate-limit windows

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::database::Database;

use super::manager::AuthService;

/// Background task deleting expired sessions and elapsed rate-limit windows
pub struct MaintenanceTask<D: Database> {
    service: Arc<AuthService<D>>,
    interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<D: Database + 'static> MaintenanceTask<D> {
    pub fn new(
        service: Arc<AuthService<D>>,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            service,
            interval: interval.max(Duration::from_secs(1)),
            shutdown_rx,
        }
    }

    /// Run until the shutdown signal is received
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Starting session maintenance");

        let mut timer = interval_at(Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    debug!("Session maintenance shutting down");
                    break;
                }
                _ = timer.tick() => {
                    match self.service.sweep_expired().await {
                        Ok(report) if report.sessions > 0 || report.rate_limit_windows > 0 => {
                            info!(
                                sessions = report.sessions,
                                rate_limit_windows = report.rate_limit_windows,
                                "Removed expired sessions and windows"
                            );
                        }
                        Ok(_) => debug!("Nothing to sweep"),
                        Err(e) => warn!(error = %e, "Session sweep failed"),
                    }
                }
            }
        }

        info!("Session maintenance stopped");
    }
}
