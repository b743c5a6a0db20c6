use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use vault_shared::errors::{AppError, AppResult, ErrorCode};
use vault_shared::types::ApiResponse;

use crate::routes::cookies;
use crate::services::{refresh_strategy, session_service, token_service};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Rotation endpoint. The envelope comes from the httpOnly cookie, with a
/// body field as fallback for non-browser clients.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<impl IntoResponse> {
    let envelope = cookies::extract_refresh_cookie(&headers)
        .or_else(|| body.and_then(|Json(req)| req.refresh_token))
        .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "missing refresh token"))?;

    // Signature and envelope expiry first (cheap, stateless), then the
    // store-backed revocation checks.
    let claims = token_service::decode_refresh_envelope(&envelope, &state.config.jwt_secret)?;
    let session = refresh_strategy::verify(&state.store, &claims).await?;

    let result = session_service::refresh(&state.store, &state.config, &session).await?;

    let cookie = cookies::refresh_cookie(&result.tokens.refresh_token, state.config.cookie_secure)
        .map_err(|e| AppError::internal(e.to_string()))?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);

    Ok((response_headers, Json(ApiResponse::ok(result))))
}
