/// Token issuance and validation
///
/// Two token types with different trust models: a short-lived signed access
/// token carrying identity claims, and a long-lived opaque refresh token whose
/// only meaning is as a lookup key into the session store. Keeping the access
/// token stateless bounds the damage of a leak to its expiry window, while the
/// server keeps unilateral revocation power over refresh tokens.
use crate::{
    config::JwtConfig,
    db::models::User,
    error::{AuthError, AuthResult},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Claims carried in an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dept: Option<String>,
    pub active: bool,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and validates access/refresh tokens
#[derive(Clone)]
pub struct TokenIssuer {
    config: JwtConfig,
}

impl TokenIssuer {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    /// Generate a signed access token for a user, returning the token and its
    /// expiry instant.
    pub fn issue_access_token(&self, user: &User) -> AuthResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(self.config.access_token_minutes);

        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.full_name(),
            dept: user.department.clone(),
            active: user.is_active,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Jwt(format!("Failed to generate token: {}", e)))?;

        Ok((token, expires_at))
    }

    /// Generate an opaque refresh token: 64 random bytes, base64-encoded.
    /// Carries no claims; never signed or decoded.
    pub fn issue_refresh_token(&self) -> String {
        let mut bytes = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE64.encode(bytes)
    }

    /// Decode and validate an access token.
    ///
    /// Signature failure, expiry, and issuer/audience mismatch all collapse to
    /// `None`; callers never see a partially trusted claim set.
    pub fn decode(&self, token: &str) -> Option<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = 0;

        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .ok()
    }

    pub fn validate(&self, token: &str) -> bool {
        self.decode(token).is_some()
    }

    /// Extract the user id from a valid access token
    pub fn user_id(&self, token: &str) -> Option<String> {
        self.decode(token).map(|claims| claims.sub)
    }
}
