/// Database layer for Aegis Auth
///
/// Manages the SQLite connection pool and the embedded schema. All queries in
/// the codebase use runtime query building, so no DATABASE_URL is needed at
/// compile time.

pub mod models;

use crate::error::{AuthError, AuthResult};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> AuthResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = sqlx::pool::PoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(AuthError::Database)?;

    Ok(pool)
}

/// Create tables and indexes if they do not exist yet.
///
/// Sessions are never physically deleted outside retention cleanup, so the
/// refresh-token uniqueness constraint is a partial index scoped to
/// non-revoked rows; revoked rows stay behind as history.
pub async fn init_schema(pool: &SqlitePool) -> AuthResult<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS user (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            department TEXT,
            avatar TEXT,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            two_factor_enabled BOOLEAN NOT NULL DEFAULT 0,
            external_provider TEXT,
            external_id TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME,
            last_login DATETIME
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            refresh_token TEXT NOT NULL CHECK (length(refresh_token) <= 500),
            created_at DATETIME NOT NULL,
            expires_at DATETIME NOT NULL,
            revoked BOOLEAN NOT NULL DEFAULT 0,
            revoked_at DATETIME,
            device_info TEXT,
            ip_address TEXT,
            user_agent TEXT,
            FOREIGN KEY (user_id) REFERENCES user(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_session_active_token
            ON session(refresh_token) WHERE revoked = 0
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_session_user ON session(user_id)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            action TEXT NOT NULL,
            success BOOLEAN NOT NULL DEFAULT 1,
            details TEXT,
            entity_type TEXT,
            entity_id TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_activity_user ON activity_log(user_id)
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(AuthError::Database)?;
    }

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> AuthResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(AuthError::Database)?;

    Ok(())
}
