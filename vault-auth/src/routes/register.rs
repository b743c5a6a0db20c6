use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use vault_shared::errors::{AppError, AppResult, ErrorCode};
use vault_shared::types::ApiResponse;

use crate::routes::cookies;
use crate::services::{auth_service, session_service};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    auth_service::validate_password(&req.password)?;

    let result = session_service::register(
        &state.store,
        &state.config,
        &req.email,
        &req.password,
        req.name,
    )
    .await?;

    let cookie = cookies::refresh_cookie(&result.tokens.refresh_token, state.config.cookie_secure)
        .map_err(|e| AppError::internal(e.to_string()))?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((StatusCode::CREATED, headers, Json(ApiResponse::ok(result))))
}
