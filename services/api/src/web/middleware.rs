//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::web::auth::session_token_from_cookie;
use crate::web::state::AppState;

/// Middleware that validates the session cookie against the in-memory
/// session store. Missing or unknown tokens get 401 Unauthorized; there is
/// no lockout and no attempt counting.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = session_token_from_cookie(cookie_header).ok_or(StatusCode::UNAUTHORIZED)?;

    if !state.sessions.contains(token).await {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}
