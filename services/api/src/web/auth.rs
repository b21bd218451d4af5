//! services/api/src/web/auth.rs
//!
//! The access gate: login and logout endpoints. Credentials are checked by
//! exact, case-sensitive equality against the two configured secrets; a
//! successful login mints an opaque token held in the process-local session
//! store.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub username: String,
}

//=========================================================================================
// Credential Check
//=========================================================================================

/// Exact equality, case-sensitive, nothing else. Deliberately not a
/// security subsystem.
pub fn credentials_match(
    expected_username: &str,
    expected_password: &str,
    username: &str,
    password: &str,
) -> bool {
    username == expected_username && password == expected_password
}

/// Pulls the session token out of a Cookie header value.
pub fn session_token_from_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header.split(';').find_map(|c| {
        c.trim()
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Exchange the configured credentials for a session cookie.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !credentials_match(
        &state.config.auth_username,
        &state.config.auth_password,
        &req.username,
        &req.password,
    ) {
        warn!("Rejected login attempt for user '{}'", req.username);
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        ));
    }

    let token = Uuid::new_v4().to_string();
    state.sessions.insert(token.clone()).await;

    // Session cookie: lives exactly as long as the login, no Max-Age.
    let cookie = format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            username: req.username,
        }),
    ))
}

/// POST /auth/logout - Invalidate the current session token.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    let token = session_token_from_cookie(cookie_header)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state.sessions.remove(token).await;

    let cookie = format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0");
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_require_exact_match() {
        assert!(credentials_match("admin", "s3cret", "admin", "s3cret"));
        assert!(!credentials_match("admin", "s3cret", "Admin", "s3cret"));
        assert!(!credentials_match("admin", "s3cret", "admin", "S3cret"));
        assert!(!credentials_match("admin", "s3cret", "admin", "s3cret "));
        assert!(!credentials_match("admin", "s3cret", "", ""));
    }

    #[test]
    fn session_token_is_found_among_other_cookies() {
        assert_eq!(
            session_token_from_cookie("theme=dark; session=abc-123; lang=en"),
            Some("abc-123")
        );
        assert_eq!(session_token_from_cookie("session=xyz"), Some("xyz"));
        assert_eq!(session_token_from_cookie("theme=dark"), None);
        // A cookie merely prefixed with "session" is not the session cookie.
        assert_eq!(session_token_from_cookie("sessionx=abc"), None);
    }
}
