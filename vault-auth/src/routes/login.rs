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
use crate::services::session_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    // One uniform rejection whether the email is unknown, the account is
    // OAuth-only, or the password is wrong.
    let user = session_service::validate_credentials(&state.store, &req.email, &req.password)
        .await?
        .ok_or_else(|| {
            AppError::new(ErrorCode::InvalidCredentials, "invalid email or password")
        })?;

    let result = session_service::login(&state.store, &state.config, user.id).await?;

    let cookie = cookies::refresh_cookie(&result.tokens.refresh_token, state.config.cookie_secure)
        .map_err(|e| AppError::internal(e.to_string()))?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((headers, Json(ApiResponse::ok(result))))
}
