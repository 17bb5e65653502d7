//! Shared admin password login and logout
//!
//! Only mounted in effect for `AUTH_STRATEGY=password`; with Supabase the
//! browser talks to the auth server directly and these return 404.

use axum::{
    extract::State,
    http::{header::{HOST, SET_COOKIE}, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use serde::Deserialize;

use crate::{
    auth::SetCookie,
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::SuccessResponse;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

/// Scope the session cookie like the gate scopes refreshed cookies
fn scoped(state: &AppState, headers: &HeaderMap, cookie: SetCookie) -> String {
    let host = headers.get(HOST).and_then(|v| v.to_str().ok());
    cookie.domain(state.classifier.cookie_domain(host)).to_string()
}

/// POST /api/auth
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let sessions = state.admin_sessions.as_ref().ok_or(ApiError::NotFound)?;

    if req.password.is_empty() {
        return Err(ApiError::Validation("Password required".to_string()));
    }

    if !sessions.verify_admin_password(&state.pool, &req.password).await? {
        tracing::info!("Rejected admin login attempt");
        return Err(ApiError::InvalidCredentials);
    }

    let cookie = sessions.issue_session_cookie().map_err(|e| {
        tracing::error!("Failed to issue admin session: {}", e);
        ApiError::Internal
    })?;
    tracing::info!("Admin logged in");

    Ok((
        AppendHeaders([(SET_COOKIE, scoped(&state, &headers, cookie))]),
        Json(SuccessResponse::ok()),
    ))
}

/// DELETE /api/auth
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let sessions = state.admin_sessions.as_ref().ok_or(ApiError::NotFound)?;
    let cookie = sessions.clear_session_cookie();

    Ok((
        AppendHeaders([(SET_COOKIE, scoped(&state, &headers, cookie))]),
        Json(SuccessResponse::ok()),
    ))
}
