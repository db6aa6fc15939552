/// Activity log store: append-only audit records
///
/// Audit writes on the auth paths are best-effort: a failed insert is logged
/// internally and never fails or rolls back the primary operation.
use crate::{
    db::models::{ActivityAction, ActivityLog},
    error::{AuthError, AuthResult},
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

/// A single audit entry to record
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub user_id: String,
    pub action: ActivityAction,
    pub success: bool,
    pub details: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ActivityEntry {
    pub fn new(user_id: impl Into<String>, action: ActivityAction, success: bool) -> Self {
        Self {
            user_id: user_id.into(),
            action,
            success,
            details: None,
            entity_type: None,
            entity_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Filter for listing audit entries
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub user_id: Option<String>,
    pub action: Option<ActivityAction>,
    pub success: Option<bool>,
}

/// Activity log store over the shared pool
pub struct ActivityLogStore {
    db: SqlitePool,
}

impl ActivityLogStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append an audit entry
    pub async fn record(&self, entry: ActivityEntry) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO activity_log (user_id, action, success, details, entity_type, \
                                       entity_id, ip_address, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.success)
        .bind(&entry.details)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(())
    }

    /// Append an audit entry, swallowing failures. Used on the auth paths
    /// where the primary operation must not fail because auditing did.
    pub async fn record_best_effort(&self, entry: ActivityEntry) {
        let action = entry.action;
        if let Err(e) = self.record(entry).await {
            tracing::warn!(action = %action, "Failed to write activity log entry: {}", e);
        }
    }

    /// List entries newest first with page-number pagination
    pub async fn list(
        &self,
        filter: &ActivityFilter,
        page: i64,
        page_size: i64,
    ) -> AuthResult<Vec<ActivityLog>> {
        let mut sql = String::from(
            "SELECT id, user_id, action, success, details, entity_type, entity_id, \
                    ip_address, user_agent, created_at
             FROM activity_log WHERE 1 = 1",
        );
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?1");
        }
        if filter.action.is_some() {
            sql.push_str(" AND action = ?2");
        }
        if filter.success.is_some() {
            sql.push_str(" AND success = ?3");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?4 OFFSET ?5");

        let offset = (page.max(1) - 1) * page_size;
        let entries = sqlx::query_as::<_, ActivityLog>(&sql)
            .bind(filter.user_id.as_deref().unwrap_or(""))
            .bind(filter.action.map(|a| a.as_str()).unwrap_or(""))
            .bind(filter.success.unwrap_or(false))
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.db)
            .await
            .map_err(AuthError::Database)?;

        Ok(entries)
    }

    /// Delete entries older than the retention window. Returns the number of
    /// rows removed; the only deletion path for audit records.
    pub async fn cleanup_older_than(&self, days: i64) -> AuthResult<u64> {
        let cutoff = Utc::now() - Duration::days(days);

        let result = sqlx::query("DELETE FROM activity_log WHERE created_at < ?1")
            .bind(cutoff)
            .execute(&self.db)
            .await
            .map_err(AuthError::Database)?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(entries_purged = purged, "Purged aged activity log entries");
        }

        Ok(purged)
    }
}
