use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use vault_shared::errors::{AppError, AppResult};
use vault_shared::types::auth::AuthUser;
use vault_shared::types::ApiResponse;

use crate::routes::cookies;
use crate::services::{session_service, token_service};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// With a resolvable refresh envelope (cookie or body) only that session
/// is revoked; without one, every active session for the user is.
pub async fn logout(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<impl IntoResponse> {
    let token_id = cookies::extract_refresh_cookie(&headers)
        .or_else(|| body.and_then(|Json(req)| req.refresh_token))
        .and_then(|envelope| {
            token_service::decode_refresh_envelope(&envelope, &state.config.jwt_secret).ok()
        })
        .map(|claims| claims.token);

    session_service::logout(&state.store, user.id, token_id).await?;

    let cookie = cookies::clear_refresh_cookie(state.config.cookie_secure)
        .map_err(|e| AppError::internal(e.to_string()))?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);

    Ok((response_headers, Json(ApiResponse::ok("logged out"))))
}
