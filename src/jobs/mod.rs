use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::activity_retention_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Revoke expired sessions on the configured interval (default hourly)
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let secs = scheduler.context.config.retention.session_cleanup_secs;
        let mut interval = interval(Duration::from_secs(secs));

        loop {
            interval.tick().await;
            info!("Running expired session cleanup");

            match tasks::cleanup_expired_sessions(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Revoked {} expired sessions", count);
                    } else {
                        info!("Session cleanup: no expired sessions found");
                    }
                }
                Err(e) => error!("Failed to cleanup expired sessions: {}", e),
            }
        }
    }

    /// Purge activity log rows past retention (runs daily)
    async fn activity_retention_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(86400));

        loop {
            interval.tick().await;
            info!("Running activity log retention cleanup");

            match tasks::cleanup_activity_log(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Purged {} activity log entries", count);
                    }
                }
                Err(e) => error!("Failed to cleanup activity log: {}", e),
            }
        }
    }

    /// Periodic health check (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
