/// User store implementation using runtime queries
///
/// Owns user records and password credentials. Password hashing is Argon2id;
/// verification never distinguishes "no such user" from "wrong password" at
/// this layer's call sites.
use crate::{
    db::models::User,
    error::{AuthError, AuthResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, department, avatar, \
     is_active, two_factor_enabled, external_provider, external_id, \
     created_at, updated_at, last_login";

/// Partial profile update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub avatar: Option<String>,
}

/// User store over the shared pool
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a new active user. Email is case-normalized before storage.
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> AuthResult<User> {
        let email = normalize_email(email);
        let password_hash = hash_password(password)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO user (id, email, password_hash, first_name, last_name, is_active, \
                               two_factor_enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, ?6)",
        )
        .bind(&id)
        .bind(&email)
        .bind(&password_hash)
        .bind(first_name)
        .bind(last_name)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(User {
            id,
            email,
            password_hash,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            department: None,
            avatar: None,
            is_active: true,
            two_factor_enabled: false,
            external_provider: None,
            external_id: None,
            created_at: now,
            updated_at: None,
            last_login: None,
        })
    }

    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM user WHERE email = ?1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM user WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.db)
                .await
                .map_err(AuthError::Database)?;

        Ok(user)
    }

    pub async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user WHERE email = ?1")
            .bind(normalize_email(email))
            .fetch_one(&self.db)
            .await
            .map_err(AuthError::Database)?;

        Ok(count > 0)
    }

    /// Verify a plaintext password against a stored hash
    pub fn verify_password(&self, password: &str, password_hash: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AuthError::Internal(format!("Corrupt password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    pub async fn update_last_login(&self, user_id: &str) -> AuthResult<()> {
        sqlx::query("UPDATE user SET last_login = ?1, updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(AuthError::Database)?;

        Ok(())
    }

    /// Replace the password hash after verifying the current password
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        if !self.verify_password(current_password, &user.password_hash)? {
            return Err(AuthError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }

        let new_hash = hash_password(new_password)?;
        sqlx::query("UPDATE user SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&new_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(AuthError::Database)?;

        Ok(())
    }

    /// Update mutable profile fields, leaving anything not provided as is.
    /// Returns the updated record.
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> AuthResult<User> {
        sqlx::query(
            "UPDATE user SET
                 first_name = COALESCE(?1, first_name),
                 last_name = COALESCE(?2, last_name),
                 department = COALESCE(?3, department),
                 avatar = COALESCE(?4, avatar),
                 updated_at = ?5
             WHERE id = ?6",
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.department)
        .bind(&update.avatar)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
    }

    /// Flip the active flag. Session revocation is the caller's concern and
    /// must happen in the same logical operation when deactivating.
    pub async fn set_active(&self, user_id: &str, active: bool) -> AuthResult<bool> {
        let result = sqlx::query("UPDATE user SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(active)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(AuthError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// List users with page-number pagination, newest first
    pub async fn list(&self, page: i64, page_size: i64) -> AuthResult<Vec<User>> {
        let offset = (page.max(1) - 1) * page_size;
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM user ORDER BY created_at DESC, id LIMIT ?1 OFFSET ?2"
        ))
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(users)
    }

    pub async fn count(&self) -> AuthResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user")
            .fetch_one(&self.db)
            .await
            .map_err(AuthError::Database)?;

        Ok(count)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    async fn setup() -> (UserStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(&dir.path().join("test.sqlite"), db::DatabaseOptions::default())
            .await
            .unwrap();
        db::init_schema(&pool).await.unwrap();
        (UserStore::new(pool), dir)
    }

    #[tokio::test]
    async fn test_create_and_find_normalizes_email() {
        let (store, _dir) = setup().await;

        let user = store
            .create("  Jane@Example.COM ", "Secret123", "Jane", "Doe")
            .await
            .unwrap();
        assert_eq!(user.email, "jane@example.com");
        assert!(user.is_active);
        assert_eq!(user.full_name(), "Jane Doe");

        let found = store.find_by_email("JANE@example.com").await.unwrap();
        assert!(found.is_some());
        assert!(store.email_exists("jane@EXAMPLE.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_password_verification() {
        let (store, _dir) = setup().await;
        let user = store
            .create("jane@example.com", "Secret123", "Jane", "Doe")
            .await
            .unwrap();

        // The hash is opaque and never the plaintext
        assert_ne!(user.password_hash, "Secret123");
        assert!(store
            .verify_password("Secret123", &user.password_hash)
            .unwrap());
        assert!(!store
            .verify_password("wrong-password", &user.password_hash)
            .unwrap());
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let (store, _dir) = setup().await;
        let user = store
            .create("jane@example.com", "Secret123", "Jane", "Doe")
            .await
            .unwrap();

        let result = store
            .change_password(&user.id, "not-the-password", "NewSecret456")
            .await;
        assert!(matches!(result, Err(AuthError::Authentication(_))));

        store
            .change_password(&user.id, "Secret123", "NewSecret456")
            .await
            .unwrap();

        let updated = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(store
            .verify_password("NewSecret456", &updated.password_hash)
            .unwrap());
        assert!(!store
            .verify_password("Secret123", &updated.password_hash)
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_profile_touches_only_provided_fields() {
        let (store, _dir) = setup().await;
        let user = store
            .create("jane@example.com", "Secret123", "Jane", "Doe")
            .await
            .unwrap();

        let updated = store
            .update_profile(
                &user.id,
                ProfileUpdate {
                    department: Some("Engineering".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.department.as_deref(), Some("Engineering"));
        assert_eq!(updated.first_name, "Jane");
        assert_eq!(updated.last_name, "Doe");
        assert!(updated.updated_at.is_some());

        let missing = store.update_profile("ghost", ProfileUpdate::default()).await;
        assert!(matches!(missing, Err(AuthError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_active() {
        let (store, _dir) = setup().await;
        let user = store
            .create("jane@example.com", "Secret123", "Jane", "Doe")
            .await
            .unwrap();

        assert!(store.set_active(&user.id, false).await.unwrap());
        let blocked = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(!blocked.is_active);

        // Unknown user affects no rows
        assert!(!store.set_active("missing", false).await.unwrap());
    }
}
