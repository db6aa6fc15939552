/// Admin endpoints, gated on the configured admin-email allow list
use crate::{
    account::UserProfile,
    activity::ActivityFilter,
    admin::{SessionView, UserStats},
    api::middleware::AdminUser,
    context::AppContext,
    db::models::{ActivityAction, ActivityLog},
    error::{AuthError, AuthResult},
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id", delete(delete_user))
        .route("/api/admin/users/:id/sessions", get(user_sessions))
        .route("/api/admin/users/:id/revoke-sessions", post(revoke_user_sessions))
        .route("/api/admin/users/:id/deactivate", post(deactivate_user))
        .route("/api/admin/users/:id/reactivate", post(reactivate_user))
        .route("/api/admin/sessions", get(all_sessions))
        .route("/api/admin/sessions/:id/revoke", post(revoke_session))
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/activity", get(activity))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    page: Option<i64>,
    page_size: Option<i64>,
}

impl PageQuery {
    fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(50).clamp(1, 200)
    }
}

/// GET /api/admin/users
async fn list_users(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> AuthResult<Json<Vec<UserProfile>>> {
    let users = ctx
        .admin_manager
        .list_users(query.page(), query.page_size())
        .await?;
    Ok(Json(users))
}

/// GET /api/admin/users/:id/sessions
async fn user_sessions(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Path(user_id): Path<String>,
) -> AuthResult<Json<Vec<SessionView>>> {
    let sessions = ctx.admin_manager.sessions_for_user(&user_id).await?;
    Ok(Json(sessions))
}

/// POST /api/admin/users/:id/deactivate
async fn deactivate_user(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(user_id): Path<String>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.admin_manager
        .deactivate_user(&admin.user_id, &user_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /api/admin/users/:id/reactivate
async fn reactivate_user(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(user_id): Path<String>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.admin_manager
        .reactivate_user(&admin.user_id, &user_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// DELETE /api/admin/users/:id
async fn delete_user(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(user_id): Path<String>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.admin_manager
        .delete_user(&admin.user_id, &user_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /api/admin/users/:id/revoke-sessions
async fn revoke_user_sessions(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(user_id): Path<String>,
) -> AuthResult<Json<serde_json::Value>> {
    let revoked = ctx
        .admin_manager
        .revoke_all_user_sessions(&admin.user_id, &user_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "revoked": revoked })))
}

#[derive(Debug, Deserialize)]
struct SessionsQuery {
    limit: Option<i64>,
}

/// GET /api/admin/sessions
async fn all_sessions(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Query(query): Query<SessionsQuery>,
) -> AuthResult<Json<Vec<SessionView>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let sessions = ctx.admin_manager.all_sessions(limit).await?;
    Ok(Json(sessions))
}

/// POST /api/admin/sessions/:id/revoke
async fn revoke_session(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(session_id): Path<i64>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.admin_manager
        .revoke_session(&admin.user_id, session_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/admin/stats
async fn stats(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
) -> AuthResult<Json<UserStats>> {
    let stats = ctx.admin_manager.user_stats().await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityQuery {
    user_id: Option<String>,
    action: Option<String>,
    success: Option<bool>,
    page: Option<i64>,
    page_size: Option<i64>,
}

/// GET /api/admin/activity
async fn activity(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Query(query): Query<ActivityQuery>,
) -> AuthResult<Json<Vec<ActivityLog>>> {
    let action = match query.action.as_deref() {
        Some(raw) => Some(
            raw.parse::<ActivityAction>()
                .map_err(|_| AuthError::Validation(format!("Unknown action: {}", raw)))?,
        ),
        None => None,
    };

    let filter = ActivityFilter {
        user_id: query.user_id,
        action,
        success: query.success,
    };

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(50).clamp(1, 200);

    let entries = ctx.activity_store.list(&filter, page, page_size).await?;
    Ok(Json(entries))
}
