/// Configuration management for Aegis Auth
use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    pub sessions: SessionConfig,
    pub retention: RetentionConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub auth_db: PathBuf,
}

/// Access/refresh token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Access token lifetime in minutes
    pub access_token_minutes: i64,
    /// Refresh token (session) lifetime in days
    pub refresh_token_days: i64,
}

/// Session policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum concurrent active sessions per user; 0 disables the cap.
    /// When the cap is hit on login, the oldest active session is evicted.
    pub max_sessions_per_user: i64,
}

/// Retention configuration for background cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Activity log rows older than this are purged
    pub activity_log_days: i64,
    /// Interval between expired-session sweeps, in seconds
    pub session_cleanup_secs: u64,
}

/// Admin surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Emails allowed to access admin endpoints (comma-separated in env)
    pub admin_emails: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AuthResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("AUTH_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("AUTH_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| AuthError::Validation("Invalid port number".to_string()))?;
        let version = env::var("AUTH_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("AUTH_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let auth_db = env::var("AUTH_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("auth.sqlite"));

        let secret = env::var("AUTH_JWT_SECRET")
            .map_err(|_| AuthError::Validation("JWT secret required".to_string()))?;
        let issuer = env::var("AUTH_JWT_ISSUER").unwrap_or_else(|_| "aegis-auth".to_string());
        let audience = env::var("AUTH_JWT_AUDIENCE").unwrap_or_else(|_| "aegis-auth".to_string());
        let access_token_minutes = env::var("AUTH_ACCESS_TOKEN_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);
        let refresh_token_days = env::var("AUTH_REFRESH_TOKEN_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let max_sessions_per_user = env::var("AUTH_MAX_SESSIONS_PER_USER")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let activity_log_days = env::var("AUTH_ACTIVITY_LOG_RETENTION_DAYS")
            .unwrap_or_else(|_| "90".to_string())
            .parse()
            .unwrap_or(90);
        let session_cleanup_secs = env::var("AUTH_SESSION_CLEANUP_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        // Parse admin emails from comma-separated list
        let admin_emails = env::var("AUTH_ADMIN_EMAILS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                auth_db,
            },
            jwt: JwtConfig {
                secret,
                issuer,
                audience,
                access_token_minutes,
                refresh_token_days,
            },
            sessions: SessionConfig {
                max_sessions_per_user,
            },
            retention: RetentionConfig {
                activity_log_days,
                session_cleanup_secs,
            },
            admin: AdminConfig { admin_emails },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AuthResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AuthError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.jwt.secret.len() < 32 {
            return Err(AuthError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.jwt.access_token_minutes <= 0 || self.jwt.refresh_token_days <= 0 {
            return Err(AuthError::Validation(
                "Token lifetimes must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
