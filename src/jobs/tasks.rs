/// Background task implementations
use crate::{context::AppContext, error::AuthResult};

/// Revoke sessions whose expiry has passed; one revocation timestamp is
/// shared by every row in the sweep.
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> AuthResult<u64> {
    ctx.session_store.cleanup_expired().await
}

/// Delete activity log rows older than the configured retention window
pub async fn cleanup_activity_log(ctx: &AppContext) -> AuthResult<u64> {
    ctx.activity_store
        .cleanup_older_than(ctx.config.retention.activity_log_days)
        .await
}

/// Health check - verify the database is reachable
pub async fn health_check(ctx: &AppContext) -> AuthResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.auth_db).await?;
    Ok(())
}
