/// Auth orchestration: register / login / refresh / logout / change-password
///
/// Composes the user store, session store, and token issuer. An account's
/// authentication status lives implicitly in its session rows; this service
/// owns every transition between them.
use crate::{
    account::{AuthResponse, UserProfile, UserStore},
    activity::{ActivityEntry, ActivityLogStore},
    config::ServerConfig,
    db::models::{ActivityAction, User, UNKNOWN_USER_ID},
    error::{AuthError, AuthResult},
    session::{DeviceMeta, NewSession, SessionStore},
    token::TokenIssuer,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Generic message for every credential failure; prevents account enumeration
const INVALID_CREDENTIALS: &str = "Invalid credentials";
/// Generic message for every refresh failure, whatever the internal reason
const INVALID_SESSION: &str = "Invalid session";

/// Auth orchestrator service
pub struct AuthService {
    users: Arc<UserStore>,
    sessions: Arc<SessionStore>,
    activity: Arc<ActivityLogStore>,
    tokens: TokenIssuer,
    config: Arc<ServerConfig>,
}

impl AuthService {
    pub fn new(
        users: Arc<UserStore>,
        sessions: Arc<SessionStore>,
        activity: Arc<ActivityLogStore>,
        tokens: TokenIssuer,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            users,
            sessions,
            activity,
            tokens,
            config,
        }
    }

    /// Register a new account and open its first session
    pub async fn register(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
        meta: DeviceMeta,
    ) -> AuthResult<AuthResponse> {
        if self.users.email_exists(email).await? {
            return Err(AuthError::Conflict("Email already registered".to_string()));
        }

        let user = self.users.create(email, password, first_name, last_name).await?;
        tracing::info!(user_id = %user.id, "Registered new user");

        self.activity
            .record_best_effort(
                ActivityEntry::new(&user.id, ActivityAction::Register, true)
                    .with_client(meta.ip_address.clone(), meta.user_agent.clone()),
            )
            .await;

        self.open_session(&user, meta).await
    }

    /// Authenticate with email and password
    ///
    /// Missing account, inactive account, and wrong password all surface the
    /// same generic error; the audit trail records the internal reason.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: DeviceMeta,
    ) -> AuthResult<AuthResponse> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                self.activity
                    .record_best_effort(
                        ActivityEntry::new(UNKNOWN_USER_ID, ActivityAction::Login, false)
                            .with_details("User not found")
                            .with_client(meta.ip_address.clone(), meta.user_agent.clone()),
                    )
                    .await;
                return Err(AuthError::Authentication(INVALID_CREDENTIALS.to_string()));
            }
        };

        if !user.is_active {
            self.activity
                .record_best_effort(
                    ActivityEntry::new(&user.id, ActivityAction::Login, false)
                        .with_details("Account inactive")
                        .with_client(meta.ip_address.clone(), meta.user_agent.clone()),
                )
                .await;
            return Err(AuthError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        if !self.users.verify_password(password, &user.password_hash)? {
            self.activity
                .record_best_effort(
                    ActivityEntry::new(&user.id, ActivityAction::Login, false)
                        .with_details("Wrong password")
                        .with_client(meta.ip_address.clone(), meta.user_agent.clone()),
                )
                .await;
            return Err(AuthError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        self.users.update_last_login(&user.id).await?;

        self.activity
            .record_best_effort(
                ActivityEntry::new(&user.id, ActivityAction::Login, true)
                    .with_client(meta.ip_address.clone(), meta.user_agent.clone()),
            )
            .await;

        // Reflect the update in the returned profile
        let user = User {
            last_login: Some(Utc::now()),
            ..user
        };

        self.open_session(&user, meta).await
    }

    /// Exchange a refresh token for a new access/refresh pair.
    ///
    /// Single-use rotation: the presented session is consumed and exactly one
    /// replacement becomes active. A concurrent second use of the same token
    /// loses the conditional revoke inside [`SessionStore::rotate`] and fails.
    pub async fn refresh(&self, refresh_token: &str, meta: DeviceMeta) -> AuthResult<AuthResponse> {
        // Combined check: unknown, revoked, and expired all collapse to the
        // same generic failure. An expired-but-unrevoked session must be
        // rejected too, so the active-lookup helper is not enough here.
        let session = self
            .sessions
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or_else(|| AuthError::Authentication(INVALID_SESSION.to_string()))?;

        if session.revoked || session.is_expired(Utc::now()) {
            return Err(AuthError::Authentication(INVALID_SESSION.to_string()));
        }

        let user = self
            .users
            .find_by_id(&session.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AuthError::Authentication(INVALID_SESSION.to_string()))?;

        let (access_token, expires_at) = self.tokens.issue_access_token(&user)?;
        let new_refresh = self.tokens.issue_refresh_token();

        let replacement = self
            .sessions
            .rotate(
                refresh_token,
                NewSession {
                    user_id: user.id.clone(),
                    refresh_token: new_refresh,
                    expires_at: self.refresh_expiry(),
                    meta,
                },
            )
            .await?
            // Lost the race to a concurrent refresh of the same token
            .ok_or_else(|| AuthError::Authentication(INVALID_SESSION.to_string()))?;

        Ok(AuthResponse {
            access_token,
            refresh_token: replacement.refresh_token,
            expires_at,
            user: UserProfile::from(&user),
        })
    }

    /// Revoke the session matching the supplied refresh token, if any.
    /// Idempotent from the caller's perspective: a missing or already-revoked
    /// session is not an error, and the logout is audited either way.
    pub async fn logout(
        &self,
        user_id: &str,
        refresh_token: Option<&str>,
        meta: DeviceMeta,
    ) -> AuthResult<bool> {
        if let Some(token) = refresh_token {
            self.sessions.revoke_by_token(token).await?;
        }

        self.activity
            .record_best_effort(
                ActivityEntry::new(user_id, ActivityAction::Logout, true)
                    .with_client(meta.ip_address, meta.user_agent),
            )
            .await;

        Ok(true)
    }

    /// Change password and force re-authentication everywhere
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
        meta: DeviceMeta,
    ) -> AuthResult<()> {
        if let Err(e) = self
            .users
            .change_password(user_id, current_password, new_password)
            .await
        {
            self.activity
                .record_best_effort(
                    ActivityEntry::new(user_id, ActivityAction::ChangePassword, false)
                        .with_client(meta.ip_address, meta.user_agent),
                )
                .await;
            return Err(e);
        }

        // Every outstanding session is revoked; the new credential must be
        // presented on every device.
        let revoked = self.sessions.revoke_all_for_user(user_id).await?;
        tracing::info!(user_id, sessions_revoked = revoked, "Password changed");

        self.activity
            .record_best_effort(
                ActivityEntry::new(user_id, ActivityAction::ChangePassword, true)
                    .with_client(meta.ip_address, meta.user_agent),
            )
            .await;

        Ok(())
    }

    /// Fetch the profile for an authenticated user
    pub async fn profile(&self, user_id: &str) -> AuthResult<UserProfile> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

        Ok(UserProfile::from(&user))
    }

    /// Mint a token pair and persist the backing session. The pair is only
    /// returned once the session row is durably written.
    async fn open_session(&self, user: &User, meta: DeviceMeta) -> AuthResult<AuthResponse> {
        self.enforce_session_cap(&user.id).await?;

        let (access_token, expires_at) = self.tokens.issue_access_token(user)?;
        let refresh_token = self.tokens.issue_refresh_token();

        let session = self
            .sessions
            .create(NewSession {
                user_id: user.id.clone(),
                refresh_token,
                expires_at: self.refresh_expiry(),
                meta,
            })
            .await?;

        Ok(AuthResponse {
            access_token,
            refresh_token: session.refresh_token,
            expires_at,
            user: UserProfile::from(user),
        })
    }

    /// Evict the oldest active session when the per-user cap is reached, so a
    /// fresh login always succeeds while bounding concurrent sessions.
    async fn enforce_session_cap(&self, user_id: &str) -> AuthResult<()> {
        let max = self.config.sessions.max_sessions_per_user;
        if max <= 0 {
            return Ok(());
        }

        while self.sessions.is_limit_reached(user_id, max).await? {
            match self.sessions.oldest_active(user_id).await? {
                Some(oldest) => {
                    self.sessions.revoke_by_id(oldest.id).await?;
                    tracing::debug!(
                        user_id,
                        session_id = oldest.id,
                        "Evicted oldest session at cap"
                    );
                }
                None => break,
            }
        }

        Ok(())
    }

    fn refresh_expiry(&self) -> chrono::DateTime<Utc> {
        Utc::now() + Duration::days(self.config.jwt.refresh_token_days)
    }
}
