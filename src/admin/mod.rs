/// Admin surface: user listing, stats, and session management
///
/// Every mutation here is an administrative act against somebody else's
/// account, so each one is written to the activity log with the acting
/// admin's id.
use crate::{
    account::{UserProfile, UserStore},
    activity::{ActivityEntry, ActivityLogStore},
    db::models::{ActivityAction, Session},
    error::{AuthError, AuthResult},
    session::SessionStore,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Aggregate counters for the admin dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: i64,
    pub active_users: i64,
    pub active_sessions: i64,
}

/// Session fields exposed to admins. The refresh token itself never leaves
/// the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

impl From<&Session> for SessionView {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id.clone(),
            created_at: s.created_at,
            expires_at: s.expires_at,
            revoked: s.revoked,
            revoked_at: s.revoked_at,
            device_info: s.device_info.clone(),
            ip_address: s.ip_address.clone(),
        }
    }
}

/// Administrative operations over users and their sessions
pub struct AdminManager {
    db: SqlitePool,
    users: Arc<UserStore>,
    sessions: Arc<SessionStore>,
    activity: Arc<ActivityLogStore>,
}

impl AdminManager {
    pub fn new(
        db: SqlitePool,
        users: Arc<UserStore>,
        sessions: Arc<SessionStore>,
        activity: Arc<ActivityLogStore>,
    ) -> Self {
        Self {
            db,
            users,
            sessions,
            activity,
        }
    }

    /// Paginated user listing
    pub async fn list_users(&self, page: i64, page_size: i64) -> AuthResult<Vec<UserProfile>> {
        let users = self.users.list(page, page_size).await?;
        Ok(users.iter().map(UserProfile::from).collect())
    }

    /// Dashboard counters
    pub async fn user_stats(&self) -> AuthResult<UserStats> {
        let total_users: i64 = sqlx::query("SELECT COUNT(*) as count FROM user")
            .fetch_one(&self.db)
            .await?
            .get("count");

        let active_users: i64 = sqlx::query("SELECT COUNT(*) as count FROM user WHERE is_active = 1")
            .fetch_one(&self.db)
            .await?
            .get("count");

        let active_sessions: i64 = sqlx::query(
            "SELECT COUNT(*) as count FROM session WHERE revoked = 0 AND expires_at > ?1",
        )
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?
        .get("count");

        Ok(UserStats {
            total_users,
            active_users,
            active_sessions,
        })
    }

    /// All sessions for one user, newest first
    pub async fn sessions_for_user(&self, user_id: &str) -> AuthResult<Vec<SessionView>> {
        let sessions = self.sessions.list_for_user(user_id).await?;
        Ok(sessions.iter().map(SessionView::from).collect())
    }

    /// Most recent active sessions across all users
    pub async fn all_sessions(&self, limit: i64) -> AuthResult<Vec<SessionView>> {
        let sessions = self.sessions.list_recent_active(limit).await?;
        Ok(sessions.iter().map(SessionView::from).collect())
    }

    /// Revoke a single session by id
    pub async fn revoke_session(&self, admin_id: &str, session_id: i64) -> AuthResult<()> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Session not found".to_string()))?;

        self.sessions.revoke_by_id(session_id).await?;

        self.activity
            .record_best_effort(
                ActivityEntry::new(admin_id, ActivityAction::RevokeSession, true)
                    .with_entity("session", session_id.to_string())
                    .with_details(format!("Revoked session for user {}", session.user_id)),
            )
            .await;

        Ok(())
    }

    /// Deactivate an account and revoke every session it holds.
    ///
    /// Both writes happen in one transaction: a blocked account must never be
    /// left with live sessions, and a session sweep must never land on an
    /// account that stays active.
    pub async fn deactivate_user(&self, admin_id: &str, user_id: &str) -> AuthResult<()> {
        let mut tx = self.db.begin().await?;

        let flipped = sqlx::query("UPDATE user SET is_active = 0, updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if flipped.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AuthError::NotFound("User not found".to_string()));
        }

        sqlx::query(
            "UPDATE session SET revoked = 1, revoked_at = ?1
             WHERE user_id = ?2 AND revoked = 0",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id, admin_id, "Deactivated user");

        self.activity
            .record_best_effort(
                ActivityEntry::new(admin_id, ActivityAction::BlockUser, true)
                    .with_entity("user", user_id),
            )
            .await;

        Ok(())
    }

    /// Revoke every active session a user holds. Returns the number revoked.
    pub async fn revoke_all_user_sessions(&self, admin_id: &str, user_id: &str) -> AuthResult<u64> {
        let revoked = self.sessions.revoke_all_for_user(user_id).await?;

        tracing::info!(user_id, admin_id, sessions_revoked = revoked, "Revoked all sessions");

        self.activity
            .record_best_effort(
                ActivityEntry::new(admin_id, ActivityAction::RevokeSession, true)
                    .with_entity("user", user_id)
                    .with_details(format!("Revoked {} sessions", revoked)),
            )
            .await;

        Ok(revoked)
    }

    /// Permanently delete an account. Session rows go with it through the
    /// foreign-key cascade; activity history stays for the audit trail.
    pub async fn delete_user(&self, admin_id: &str, user_id: &str) -> AuthResult<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        let result = sqlx::query("DELETE FROM user WHERE id = ?1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("User not found".to_string()));
        }

        tracing::info!(user_id, admin_id, "Deleted user");

        self.activity
            .record_best_effort(
                ActivityEntry::new(admin_id, ActivityAction::DeleteUser, true)
                    .with_entity("user", user_id)
                    .with_details(format!("Deleted account {}", user.email)),
            )
            .await;

        Ok(())
    }

    /// Reactivate a previously deactivated account. Old sessions stay
    /// revoked; the user logs in fresh.
    pub async fn reactivate_user(&self, admin_id: &str, user_id: &str) -> AuthResult<()> {
        if !self.users.set_active(user_id, true).await? {
            return Err(AuthError::NotFound("User not found".to_string()));
        }

        tracing::info!(user_id, admin_id, "Reactivated user");

        self.activity
            .record_best_effort(
                ActivityEntry::new(admin_id, ActivityAction::UnblockUser, true)
                    .with_entity("user", user_id),
            )
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::session::{DeviceMeta, NewSession};
    use chrono::Duration;
    use tempfile::TempDir;

    struct Harness {
        admin: AdminManager,
        users: Arc<UserStore>,
        sessions: Arc<SessionStore>,
        _dir: TempDir,
    }

    async fn setup() -> Harness {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(&dir.path().join("test.sqlite"), db::DatabaseOptions::default())
            .await
            .unwrap();
        db::init_schema(&pool).await.unwrap();

        let users = Arc::new(UserStore::new(pool.clone()));
        let sessions = Arc::new(SessionStore::new(pool.clone()));
        let activity = Arc::new(ActivityLogStore::new(pool.clone()));
        let admin = AdminManager::new(
            pool,
            Arc::clone(&users),
            Arc::clone(&sessions),
            activity,
        );

        Harness {
            admin,
            users,
            sessions,
            _dir: dir,
        }
    }

    async fn seed_user(h: &Harness, email: &str) -> String {
        h.users
            .create(email, "Secret123", "Test", "User")
            .await
            .unwrap()
            .id
    }

    async fn seed_session(h: &Harness, user_id: &str, token: &str) -> i64 {
        h.sessions
            .create(NewSession {
                user_id: user_id.to_string(),
                refresh_token: token.to_string(),
                expires_at: Utc::now() + Duration::days(30),
                meta: DeviceMeta::default(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_user_stats_counts_active_only() {
        let h = setup().await;
        let alice = seed_user(&h, "alice@example.com").await;
        let bob = seed_user(&h, "bob@example.com").await;
        h.users.set_active(&bob, false).await.unwrap();

        seed_session(&h, &alice, "tok-1").await;
        // Expired session does not count
        h.sessions
            .create(NewSession {
                user_id: alice.clone(),
                refresh_token: "tok-stale".to_string(),
                expires_at: Utc::now() - Duration::seconds(1),
                meta: DeviceMeta::default(),
            })
            .await
            .unwrap();

        let stats = h.admin.user_stats().await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.active_sessions, 1);
    }

    #[tokio::test]
    async fn test_revoke_session_by_id() {
        let h = setup().await;
        let alice = seed_user(&h, "alice@example.com").await;
        let id = seed_session(&h, &alice, "tok-1").await;

        h.admin.revoke_session("admin-1", id).await.unwrap();

        let views = h.admin.sessions_for_user(&alice).await.unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].revoked);
        assert!(views[0].revoked_at.is_some());

        let missing = h.admin.revoke_session("admin-1", 9999).await;
        assert!(matches!(missing, Err(AuthError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deactivate_revokes_all_sessions_atomically() {
        let h = setup().await;
        let alice = seed_user(&h, "alice@example.com").await;
        for i in 0..3 {
            seed_session(&h, &alice, &format!("tok-{i}")).await;
        }
        assert_eq!(h.sessions.count_active(&alice).await.unwrap(), 3);

        h.admin.deactivate_user("admin-1", &alice).await.unwrap();

        let user = h.users.find_by_id(&alice).await.unwrap().unwrap();
        assert!(!user.is_active);
        assert_eq!(h.sessions.count_active(&alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reactivate_does_not_restore_sessions() {
        let h = setup().await;
        let alice = seed_user(&h, "alice@example.com").await;
        seed_session(&h, &alice, "tok-1").await;
        h.admin.deactivate_user("admin-1", &alice).await.unwrap();

        h.admin.reactivate_user("admin-1", &alice).await.unwrap();

        let user = h.users.find_by_id(&alice).await.unwrap().unwrap();
        assert!(user.is_active);
        assert_eq!(h.sessions.count_active(&alice).await.unwrap(), 0);

        let missing = h.admin.reactivate_user("admin-1", "no-such-user").await;
        assert!(matches!(missing, Err(AuthError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_all_sessions_lists_active_newest_first() {
        let h = setup().await;
        let alice = seed_user(&h, "alice@example.com").await;
        let bob = seed_user(&h, "bob@example.com").await;

        let first = seed_session(&h, &alice, "tok-a").await;
        let second = seed_session(&h, &bob, "tok-b").await;
        let revoked = seed_session(&h, &alice, "tok-c").await;
        h.sessions.revoke_by_id(revoked).await.unwrap();
        // Expired sessions are excluded too
        h.sessions
            .create(NewSession {
                user_id: bob.clone(),
                refresh_token: "tok-stale".to_string(),
                expires_at: Utc::now() - Duration::seconds(1),
                meta: DeviceMeta::default(),
            })
            .await
            .unwrap();

        let views = h.admin.all_sessions(50).await.unwrap();
        let ids: Vec<i64> = views.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![second, first]);

        let capped = h.admin.all_sessions(1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, second);
    }

    #[tokio::test]
    async fn test_revoke_all_user_sessions() {
        let h = setup().await;
        let alice = seed_user(&h, "alice@example.com").await;
        let bob = seed_user(&h, "bob@example.com").await;
        for i in 0..3 {
            seed_session(&h, &alice, &format!("tok-a{i}")).await;
        }
        seed_session(&h, &bob, "tok-b").await;

        let revoked = h
            .admin
            .revoke_all_user_sessions("admin-1", &alice)
            .await
            .unwrap();
        assert_eq!(revoked, 3);
        assert_eq!(h.sessions.count_active(&alice).await.unwrap(), 0);
        // Untouched other users
        assert_eq!(h.sessions.count_active(&bob).await.unwrap(), 1);

        // Account itself stays active and can log in again
        let user = h.users.find_by_id(&alice).await.unwrap().unwrap();
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn test_delete_user_cascades_to_sessions() {
        let h = setup().await;
        let alice = seed_user(&h, "alice@example.com").await;
        for i in 0..2 {
            seed_session(&h, &alice, &format!("tok-{i}")).await;
        }

        h.admin.delete_user("admin-1", &alice).await.unwrap();

        assert!(h.users.find_by_id(&alice).await.unwrap().is_none());
        // Session rows are gone with the account, not merely revoked
        assert!(h.admin.sessions_for_user(&alice).await.unwrap().is_empty());

        let missing = h.admin.delete_user("admin-1", &alice).await;
        assert!(matches!(missing, Err(AuthError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deactivate_unknown_user_rolls_back() {
        let h = setup().await;
        let result = h.admin.deactivate_user("admin-1", "ghost").await;
        assert!(matches!(result, Err(AuthError::NotFound(_))));
    }
}
