/// Application context and dependency injection
use crate::{
    account::UserStore,
    activity::ActivityLogStore,
    admin::AdminManager,
    auth::AuthService,
    config::ServerConfig,
    db,
    error::{AuthError, AuthResult},
    session::SessionStore,
    token::TokenIssuer,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub auth_db: SqlitePool,
    pub user_store: Arc<UserStore>,
    pub session_store: Arc<SessionStore>,
    pub activity_store: Arc<ActivityLogStore>,
    pub token_issuer: TokenIssuer,
    pub auth_service: Arc<AuthService>,
    pub admin_manager: Arc<AdminManager>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AuthResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let auth_db =
            db::create_pool(&config.storage.auth_db, db::DatabaseOptions::default()).await?;
        db::init_schema(&auth_db).await?;
        db::test_connection(&auth_db).await?;

        let config = Arc::new(config);

        let user_store = Arc::new(UserStore::new(auth_db.clone()));
        let session_store = Arc::new(SessionStore::new(auth_db.clone()));
        let activity_store = Arc::new(ActivityLogStore::new(auth_db.clone()));
        let token_issuer = TokenIssuer::new(config.jwt.clone());

        let auth_service = Arc::new(AuthService::new(
            Arc::clone(&user_store),
            Arc::clone(&session_store),
            Arc::clone(&activity_store),
            token_issuer.clone(),
            Arc::clone(&config),
        ));

        let admin_manager = Arc::new(AdminManager::new(
            auth_db.clone(),
            Arc::clone(&user_store),
            Arc::clone(&session_store),
            Arc::clone(&activity_store),
        ));

        tracing::info!("Application context initialized");

        Ok(Self {
            config,
            auth_db,
            user_store,
            session_store,
            activity_store,
            token_issuer,
            auth_service,
            admin_manager,
        })
    }

    /// Ensure required data directories exist
    async fn ensure_directories(config: &ServerConfig) -> AuthResult<()> {
        tokio::fs::create_dir_all(&config.storage.data_directory)
            .await
            .map_err(|e| {
                AuthError::Internal(format!("Failed to create data directory: {}", e))
            })?;

        if let Some(parent) = config.storage.auth_db.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AuthError::Internal(format!("Failed to create database directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// True when the given email belongs to a configured admin
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.config
            .admin
            .admin_emails
            .iter()
            .any(|allowed| allowed == &email)
    }
}
