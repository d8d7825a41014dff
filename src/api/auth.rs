use axum::{
    Extension, Json,
    extract::{Query, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::services::{AuditEntry, ClientContext, UserInfo};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub identifier: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub session_token: String,
    pub user: UserInfo,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<u64>,
}

/// Principal resolved by `require_auth`, injected into request extensions.
/// Handlers receive it via `Extension<CurrentUser>` — there is no
/// process-wide "current user".
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Authentication guard for protected routes. Resolves the bearer session
/// token once per request; validation refreshes the session's activity
/// timestamp and revokes it when expired.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let Some(token) = extract_session_token(request.headers()) else {
        return Err(ApiError::Unauthorized("Missing session token".to_string()));
    };

    let user_id = state
        .auth()
        .validate(&token)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

    tracing::Span::current().record("user_id", &user_id);
    request.extensions_mut().insert(CurrentUser { user_id });

    Ok(next.run(request).await)
}

/// Extract the session token from headers:
/// 1. `Authorization: Bearer <token>`
/// 2. `X-Session-Token` header
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    if let Some(token) = headers.get("X-Session-Token")
        && let Ok(token_str) = token.to_str()
    {
        return Some(token_str.to_string());
    }

    None
}

/// Caller context passed through to audit events, never parsed.
fn client_context(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    (ip, user_agent)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
/// Create an account. The very first account becomes the administrator
/// (first-run setup); every later registration is a regular user.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<RegisterResponse>>, ApiError> {
    let is_first_user = state.auth().user_count().await.map_err(ApiError::from)? == 0;

    let user_id = state
        .auth()
        .register(
            &payload.username,
            &payload.email,
            &payload.password,
            is_first_user,
        )
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(RegisterResponse { user_id })))
}

/// POST /auth/login
/// Authenticate with username or email, returns a session token on success
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.identifier.is_empty() {
        return Err(ApiError::validation("Username or email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let (ip, user_agent) = client_context(&headers);
    let client = ClientContext {
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
    };

    let session_token = state
        .auth()
        .login(&payload.identifier, &payload.password, client)
        .await
        .map_err(ApiError::from)?;

    let user_id = state
        .auth()
        .validate(&session_token)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::internal("Session vanished right after login"))?;

    let user = state
        .auth()
        .profile(&user_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(LoginResponse {
        session_token,
        user,
    })))
}

/// POST /auth/logout
/// Deactivate the presented session. Idempotent; absent tokens are fine.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<LogoutResponse>>, ApiError> {
    let logged_out = match extract_session_token(&headers) {
        Some(token) => state.auth().logout(&token).await.map_err(ApiError::from)?,
        None => false,
    };

    Ok(Json(ApiResponse::success(LogoutResponse { logged_out })))
}

/// GET /auth/me
/// Current principal's profile (requires authentication)
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let user = state
        .auth()
        .profile(&current.user_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(user)))
}

/// PUT /auth/password
/// Change password (requires current password verification)
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth()
        .change_password(
            &current.user_id,
            &payload.current_password,
            &payload.new_password,
        )
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}

/// POST /auth/password/reset
/// Complete a password reset with a previously issued token
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth()
        .reset_password(&payload.token, &payload.new_password)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password reset successfully".to_string(),
    })))
}

/// GET /auth/audit?limit=N
/// Recent security events, newest first. The admin check happens in the
/// auth service, not here.
pub async fn get_audit_events(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, ApiError> {
    let events = state
        .auth()
        .recent_audit_events(&current.user_id, query.limit.unwrap_or(100))
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(events)))
}
