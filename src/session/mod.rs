/// Session store: durable refresh-token sessions with revocation and expiry
///
/// Sessions are only ever mutated to flip `revoked`/`revoked_at`; rows are
/// never deleted outside retention. All revocation paths are conditional
/// single-statement updates (`... AND revoked = 0`) so a session can never be
/// un-revoked and `revoked_at` is written exactly once.
use crate::{
    db::models::Session,
    error::{AuthError, AuthResult},
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Client metadata captured at session creation
#[derive(Debug, Clone, Default)]
pub struct DeviceMeta {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl DeviceMeta {
    /// Derive device info from a user agent, truncated to the column cap.
    pub fn from_user_agent(user_agent: Option<String>, ip_address: Option<String>) -> Self {
        let device_info = user_agent.as_ref().map(|ua| {
            let mut info = ua.clone();
            // Back off to a char boundary so multi-byte input cannot panic
            let mut cap = 500.min(info.len());
            while !info.is_char_boundary(cap) {
                cap -= 1;
            }
            info.truncate(cap);
            info
        });
        Self {
            device_info,
            ip_address,
            user_agent,
        }
    }
}

/// Parameters for a session insert
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub meta: DeviceMeta,
}

const SESSION_COLUMNS: &str = "id, user_id, refresh_token, created_at, expires_at, \
     revoked, revoked_at, device_info, ip_address, user_agent";

/// Session store over the shared pool
pub struct SessionStore {
    db: SqlitePool,
}

impl SessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a new, unrevoked session
    pub async fn create(&self, new: NewSession) -> AuthResult<Session> {
        let now = Utc::now();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO session (user_id, refresh_token, created_at, expires_at, revoked, \
                                  device_info, ip_address, user_agent)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)
             RETURNING id",
        )
        .bind(&new.user_id)
        .bind(&new.refresh_token)
        .bind(now)
        .bind(new.expires_at)
        .bind(&new.meta.device_info)
        .bind(&new.meta.ip_address)
        .bind(&new.meta.user_agent)
        .fetch_one(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(Session {
            id,
            user_id: new.user_id,
            refresh_token: new.refresh_token,
            created_at: now,
            expires_at: new.expires_at,
            revoked: false,
            revoked_at: None,
            device_info: new.meta.device_info,
            ip_address: new.meta.ip_address,
            user_agent: new.meta.user_agent,
        })
    }

    /// Look up a non-revoked session by refresh token. Expiry is not filtered
    /// here; the refresh flow applies its own combined check.
    pub async fn find_active_by_refresh_token(&self, token: &str) -> AuthResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE refresh_token = ?1 AND revoked = 0"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(session)
    }

    /// Look up a session by refresh token regardless of state
    pub async fn find_by_refresh_token(&self, token: &str) -> AuthResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE refresh_token = ?1
             ORDER BY revoked ASC, id DESC LIMIT 1"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(session)
    }

    pub async fn find_by_id(&self, id: i64) -> AuthResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(session)
    }

    /// Revoke the session holding this refresh token. Returns whether a row
    /// transitioned; revoking an already-revoked session is a no-op and its
    /// `revoked_at` is left untouched.
    pub async fn revoke_by_token(&self, token: &str) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE session SET revoked = 1, revoked_at = ?1
             WHERE refresh_token = ?2 AND revoked = 0",
        )
        .bind(Utc::now())
        .bind(token)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke a session by id (admin surface)
    pub async fn revoke_by_id(&self, id: i64) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE session SET revoked = 1, revoked_at = ?1 WHERE id = ?2 AND revoked = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke every active session for a user in one batch, all sharing the
    /// same revocation timestamp. Returns the number of sessions revoked.
    pub async fn revoke_all_for_user(&self, user_id: &str) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE session SET revoked = 1, revoked_at = ?1
             WHERE user_id = ?2 AND revoked = 0",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(result.rows_affected())
    }

    /// Revoke every active session for a user except the one holding
    /// `keep_token` (a fresh login should not invalidate itself).
    pub async fn revoke_all_except(&self, user_id: &str, keep_token: &str) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE session SET revoked = 1, revoked_at = ?1
             WHERE user_id = ?2 AND revoked = 0 AND refresh_token != ?3",
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(keep_token)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(result.rows_affected())
    }

    /// Count sessions that are neither revoked nor expired
    pub async fn count_active(&self, user_id: &str) -> AuthResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM session
             WHERE user_id = ?1 AND revoked = 0 AND expires_at > ?2",
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(count)
    }

    /// Whether the user has reached the concurrent-session cap. Advisory: the
    /// store itself never rejects inserts past the cap.
    pub async fn is_limit_reached(&self, user_id: &str, max_sessions: i64) -> AuthResult<bool> {
        Ok(self.count_active(user_id).await? >= max_sessions)
    }

    /// Oldest active session for a user, used for cap eviction
    pub async fn oldest_active(&self, user_id: &str) -> AuthResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session
             WHERE user_id = ?1 AND revoked = 0 AND expires_at > ?2
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(user_id)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(session)
    }

    /// All sessions for a user, newest first
    pub async fn list_for_user(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(sessions)
    }

    /// Most recent active sessions across all users (admin surface)
    pub async fn list_recent_active(&self, limit: i64) -> AuthResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session
             WHERE revoked = 0 AND expires_at > ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))
        .bind(Utc::now())
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(sessions)
    }

    /// Sessions past their expiry instant and not yet revoked
    pub async fn list_expired_unrevoked(&self) -> AuthResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE expires_at <= ?1 AND revoked = 0"
        ))
        .bind(Utc::now())
        .fetch_all(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(sessions)
    }

    /// Revoke all expired-but-unrevoked sessions in bulk with a shared
    /// timestamp. The only path that revokes based on time rather than an
    /// explicit action. Returns the number of sessions swept.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE session SET revoked = 1, revoked_at = ?1
             WHERE expires_at <= ?1 AND revoked = 0",
        )
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        let swept = result.rows_affected();
        if swept > 0 {
            tracing::info!(sessions_revoked = swept, "Swept expired sessions");
        } else {
            tracing::debug!("Session cleanup: no expired sessions found");
        }

        Ok(swept)
    }

    /// Consume `old_token` and insert its replacement in one transaction.
    ///
    /// The revoke is conditional on `revoked = 0`, so of two concurrent
    /// rotations of the same token exactly one observes an affected row; the
    /// loser gets `None` and must not mint a pair. The old session is never
    /// observable as revoked without its replacement, and vice versa.
    pub async fn rotate(&self, old_token: &str, new: NewSession) -> AuthResult<Option<Session>> {
        let mut tx = self.db.begin().await.map_err(AuthError::Database)?;
        let now = Utc::now();

        let revoked = sqlx::query(
            "UPDATE session SET revoked = 1, revoked_at = ?1
             WHERE refresh_token = ?2 AND revoked = 0",
        )
        .bind(now)
        .bind(old_token)
        .execute(&mut *tx)
        .await
        .map_err(AuthError::Database)?;

        if revoked.rows_affected() == 0 {
            // Already consumed by a concurrent refresh
            tx.rollback().await.map_err(AuthError::Database)?;
            return Ok(None);
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO session (user_id, refresh_token, created_at, expires_at, revoked, \
                                  device_info, ip_address, user_agent)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)
             RETURNING id",
        )
        .bind(&new.user_id)
        .bind(&new.refresh_token)
        .bind(now)
        .bind(new.expires_at)
        .bind(&new.meta.device_info)
        .bind(&new.meta.ip_address)
        .bind(&new.meta.user_agent)
        .fetch_one(&mut *tx)
        .await
        .map_err(AuthError::Database)?;

        tx.commit().await.map_err(AuthError::Database)?;

        Ok(Some(Session {
            id,
            user_id: new.user_id,
            refresh_token: new.refresh_token,
            created_at: now,
            expires_at: new.expires_at,
            revoked: false,
            revoked_at: None,
            device_info: new.meta.device_info,
            ip_address: new.meta.ip_address,
            user_agent: new.meta.user_agent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn setup() -> (SessionStore, SqlitePool, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(&dir.path().join("test.sqlite"), db::DatabaseOptions::default())
            .await
            .unwrap();
        db::init_schema(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO user (id, email, password_hash, first_name, last_name, is_active, \
                               two_factor_enabled, created_at)
             VALUES ('user-1', 'jane@example.com', 'hash', 'Jane', 'Doe', 1, 0, ?1)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        (SessionStore::new(pool.clone()), pool, dir)
    }

    fn new_session(token: &str, expires_in: Duration) -> NewSession {
        NewSession {
            user_id: "user-1".to_string(),
            refresh_token: token.to_string(),
            expires_at: Utc::now() + expires_in,
            meta: DeviceMeta::default(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_active() {
        let (store, _pool, _dir) = setup().await;

        let session = store
            .create(new_session("token-a", Duration::days(30)))
            .await
            .unwrap();
        assert!(!session.revoked);
        assert!(session.revoked_at.is_none());

        let found = store
            .find_active_by_refresh_token("token-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.user_id, "user-1");

        assert!(store
            .find_active_by_refresh_token("token-missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_one_way_and_idempotent() {
        let (store, _pool, _dir) = setup().await;
        store
            .create(new_session("token-a", Duration::days(30)))
            .await
            .unwrap();

        assert!(store.revoke_by_token("token-a").await.unwrap());
        let revoked = store
            .find_by_refresh_token("token-a")
            .await
            .unwrap()
            .unwrap();
        assert!(revoked.revoked);
        let first_revoked_at = revoked.revoked_at.unwrap();

        // Second revoke is a no-op; the timestamp is written exactly once
        assert!(!store.revoke_by_token("token-a").await.unwrap());
        let again = store
            .find_by_refresh_token("token-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.revoked_at.unwrap(), first_revoked_at);

        // The active lookup no longer sees it
        assert!(store
            .find_active_by_refresh_token("token-a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_count_active_and_limit() {
        let (store, _pool, _dir) = setup().await;

        for i in 0..3 {
            store
                .create(new_session(&format!("token-{}", i), Duration::days(30)))
                .await
                .unwrap();
        }
        // Expired sessions do not count as active
        store
            .create(new_session("token-expired", Duration::seconds(-10)))
            .await
            .unwrap();

        assert_eq!(store.count_active("user-1").await.unwrap(), 3);
        assert!(store.is_limit_reached("user-1", 3).await.unwrap());
        assert!(!store.is_limit_reached("user-1", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_shares_timestamp() {
        let (store, _pool, _dir) = setup().await;
        for i in 0..3 {
            store
                .create(new_session(&format!("token-{}", i), Duration::days(30)))
                .await
                .unwrap();
        }

        assert_eq!(store.revoke_all_for_user("user-1").await.unwrap(), 3);
        assert_eq!(store.count_active("user-1").await.unwrap(), 0);

        let sessions = store.list_for_user("user-1").await.unwrap();
        let stamps: Vec<_> = sessions.iter().map(|s| s.revoked_at.unwrap()).collect();
        assert!(stamps.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_revoke_all_except_keeps_current() {
        let (store, _pool, _dir) = setup().await;
        for i in 0..3 {
            store
                .create(new_session(&format!("token-{}", i), Duration::days(30)))
                .await
                .unwrap();
        }

        assert_eq!(
            store.revoke_all_except("user-1", "token-1").await.unwrap(),
            2
        );
        let kept = store
            .find_active_by_refresh_token("token-1")
            .await
            .unwrap();
        assert!(kept.is_some());
        assert_eq!(store.count_active("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_expired_boundary_and_batch() {
        let (store, _pool, _dir) = setup().await;

        // 5 expired-but-unrevoked, 2 active
        for i in 0..5 {
            store
                .create(new_session(&format!("expired-{}", i), Duration::seconds(-1)))
                .await
                .unwrap();
        }
        for i in 0..2 {
            store
                .create(new_session(&format!("live-{}", i), Duration::days(30)))
                .await
                .unwrap();
        }

        let swept = store.cleanup_expired().await.unwrap();
        assert_eq!(swept, 5);
        assert_eq!(store.count_active("user-1").await.unwrap(), 2);
        assert!(store.list_expired_unrevoked().await.unwrap().is_empty());

        // The whole batch shares one revocation timestamp
        let sessions = store.list_for_user("user-1").await.unwrap();
        let stamps: Vec<_> = sessions
            .iter()
            .filter(|s| s.revoked)
            .map(|s| s.revoked_at.unwrap())
            .collect();
        assert_eq!(stamps.len(), 5);
        assert!(stamps.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_expiry_is_inclusive_of_now() {
        let now = Utc::now();
        let session = Session {
            id: 1,
            user_id: "user-1".to_string(),
            refresh_token: "t".to_string(),
            created_at: now,
            expires_at: now,
            revoked: false,
            revoked_at: None,
            device_info: None,
            ip_address: None,
            user_agent: None,
        };

        // expires_at exactly equal to now counts as expired
        assert!(session.is_expired(now));
        assert!(!session.is_active(now));
        assert!(!session.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn test_device_info_truncates_on_char_boundary() {
        // '€' is three bytes; byte 500 falls mid-character
        let ua = "€".repeat(200);
        let meta = DeviceMeta::from_user_agent(Some(ua.clone()), None);

        let info = meta.device_info.unwrap();
        assert!(info.len() <= 500);
        assert_eq!(info, "€".repeat(166));
        // The raw user agent is kept untruncated
        assert_eq!(meta.user_agent.as_deref(), Some(ua.as_str()));

        let short = DeviceMeta::from_user_agent(Some("Mozilla/5.0".to_string()), None);
        assert_eq!(short.device_info.as_deref(), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_rotate_swaps_old_for_new() {
        let (store, _pool, _dir) = setup().await;
        store
            .create(new_session("old-token", Duration::days(30)))
            .await
            .unwrap();

        let replacement = store
            .rotate("old-token", new_session("new-token", Duration::days(30)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replacement.refresh_token, "new-token");

        let old = store
            .find_by_refresh_token("old-token")
            .await
            .unwrap()
            .unwrap();
        assert!(old.revoked);
        assert!(old.revoked_at.is_some());
        assert_eq!(store.count_active("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rotate_consumed_token_loses() {
        let (store, _pool, _dir) = setup().await;
        store
            .create(new_session("old-token", Duration::days(30)))
            .await
            .unwrap();

        store
            .rotate("old-token", new_session("new-1", Duration::days(30)))
            .await
            .unwrap()
            .unwrap();

        // Second rotation of the same token must not mint a session
        let second = store
            .rotate("old-token", new_session("new-2", Duration::days(30)))
            .await
            .unwrap();
        assert!(second.is_none());
        assert!(store
            .find_by_refresh_token("new-2")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.count_active("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_rotate_single_winner() {
        let (store, pool, _dir) = setup().await;
        store
            .create(new_session("shared-token", Duration::days(30)))
            .await
            .unwrap();

        let store_a = SessionStore::new(pool.clone());
        let store_b = SessionStore::new(pool.clone());

        let (a, b) = tokio::join!(
            store_a.rotate("shared-token", new_session("winner-a", Duration::days(30))),
            store_b.rotate("shared-token", new_session("winner-b", Duration::days(30))),
        );

        let a = a.unwrap();
        let b = b.unwrap();
        assert!(
            a.is_some() ^ b.is_some(),
            "exactly one rotation must win, got a={:?} b={:?}",
            a.is_some(),
            b.is_some()
        );
        // Never two sessions descending from one refresh-token use
        assert_eq!(store.count_active("user-1").await.unwrap(), 1);
    }
}
