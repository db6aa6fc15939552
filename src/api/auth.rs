/// Authentication endpoints
use crate::{
    account::{
        AuthResponse, ChangePasswordRequest, LoginRequest, LogoutRequest, LogoutResponse,
        ProfileUpdate, RefreshRequest, RegisterRequest, UpdateProfileRequest, UserProfile,
    },
    api::middleware::{device_meta, AuthUser},
    context::AppContext,
    error::{AuthError, AuthResult},
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/change-password", post(change_password))
        .route("/api/auth/me", get(me).put(update_me))
}

/// POST /api/auth/register
async fn register(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<Json<AuthResponse>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let response = ctx
        .auth_service
        .register(
            &req.first_name,
            &req.last_name,
            &req.email,
            &req.password,
            device_meta(&headers),
        )
        .await?;

    Ok(Json(response))
}

/// POST /api/auth/login
async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<AuthResponse>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let response = ctx
        .auth_service
        .login(&req.email, &req.password, device_meta(&headers))
        .await?;

    Ok(Json(response))
}

/// POST /api/auth/refresh
async fn refresh(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> AuthResult<Json<AuthResponse>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let response = ctx
        .auth_service
        .refresh(&req.refresh_token, device_meta(&headers))
        .await?;

    Ok(Json(response))
}

/// POST /api/auth/logout
async fn logout(
    State(ctx): State<AppContext>,
    user: AuthUser,
    headers: HeaderMap,
    Json(req): Json<LogoutRequest>,
) -> AuthResult<Json<LogoutResponse>> {
    let success = ctx
        .auth_service
        .logout(
            &user.user_id,
            req.refresh_token.as_deref(),
            device_meta(&headers),
        )
        .await?;

    Ok(Json(LogoutResponse { success }))
}

/// POST /api/auth/change-password
async fn change_password(
    State(ctx): State<AppContext>,
    user: AuthUser,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> AuthResult<Json<LogoutResponse>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    ctx.auth_service
        .change_password(
            &user.user_id,
            &req.current_password,
            &req.new_password,
            device_meta(&headers),
        )
        .await?;

    Ok(Json(LogoutResponse { success: true }))
}

/// GET /api/auth/me
async fn me(State(ctx): State<AppContext>, user: AuthUser) -> AuthResult<Json<UserProfile>> {
    let profile = ctx.auth_service.profile(&user.user_id).await?;
    Ok(Json(profile))
}

/// PUT /api/auth/me
async fn update_me(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> AuthResult<Json<UserProfile>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let updated = ctx
        .user_store
        .update_profile(
            &user.user_id,
            ProfileUpdate {
                first_name: req.first_name,
                last_name: req.last_name,
                department: req.department,
                avatar: req.avatar,
            },
        )
        .await?;

    Ok(Json(UserProfile::from(&updated)))
}
