/// Authentication extractors and request utilities
use crate::{
    context::AppContext,
    error::AuthError,
    session::DeviceMeta,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| {
            if s.starts_with("Bearer ") {
                Some(s[7..].to_string())
            } else {
                None
            }
        })
}

/// Build session device metadata from request headers
pub fn device_meta(headers: &HeaderMap) -> DeviceMeta {
    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());

    DeviceMeta::from_user_agent(user_agent, ip_address)
}

/// Authenticated user, extracted from a bearer access token.
///
/// Token claims are verified first, then the account is re-read so that a
/// deactivation takes effect immediately rather than at token expiry.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AuthError::Authentication("Missing authorization header".to_string()))?;

        let claims = state
            .token_issuer
            .decode(&token)
            .ok_or_else(|| AuthError::Authentication("Invalid or expired token".to_string()))?;

        let user = state
            .user_store
            .find_by_id(&claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AuthError::Authentication("Invalid or expired token".to_string()))?;

        Ok(AuthUser {
            user_id: user.id,
            email: user.email,
        })
    }
}

/// Authenticated admin; a valid [`AuthUser`] whose email is on the configured
/// allow list.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user_id: String,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        if !state.is_admin_email(&user.email) {
            return Err(AuthError::Authorization(
                "Admin access required".to_string(),
            ));
        }

        Ok(AdminUser {
            user_id: user.user_id,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("abc123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic abc123".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);

        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_device_meta_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "TestClient/1.0".parse().unwrap());
        headers.insert("x-forwarded-for", "10.0.0.1, 172.16.0.1".parse().unwrap());

        let meta = device_meta(&headers);
        assert_eq!(meta.user_agent.as_deref(), Some("TestClient/1.0"));
        assert_eq!(meta.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(meta.device_info.as_deref(), Some("TestClient/1.0"));
    }
}
