/// Database models for Aegis Auth
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sentinel user id recorded on audit entries when authentication failed
/// before identity resolution.
pub const UNKNOWN_USER_ID: &str = "unknown";

/// User record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    pub external_provider: Option<String>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Refresh-token session record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub user_id: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Session {
    /// A session whose expiry instant has been reached counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired(now)
    }
}

/// Append-only audit record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: String,
    pub action: String,
    pub success: bool,
    pub details: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audited action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Register,
    Login,
    Logout,
    ChangePassword,
    BlockUser,
    UnblockUser,
    DeleteUser,
    RevokeSession,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Register => "register",
            ActivityAction::Login => "login",
            ActivityAction::Logout => "logout",
            ActivityAction::ChangePassword => "change_password",
            ActivityAction::BlockUser => "block_user",
            ActivityAction::UnblockUser => "unblock_user",
            ActivityAction::DeleteUser => "delete_user",
            ActivityAction::RevokeSession => "revoke_session",
        }
    }
}

impl std::str::FromStr for ActivityAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register" => Ok(ActivityAction::Register),
            "login" => Ok(ActivityAction::Login),
            "logout" => Ok(ActivityAction::Logout),
            "change_password" => Ok(ActivityAction::ChangePassword),
            "block_user" => Ok(ActivityAction::BlockUser),
            "unblock_user" => Ok(ActivityAction::UnblockUser),
            "delete_user" => Ok(ActivityAction::DeleteUser),
            "revoke_session" => Ok(ActivityAction::RevokeSession),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
