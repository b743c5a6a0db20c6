use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use vault_shared::errors::AppResult;
use vault_shared::types::auth::{AuthUser, PublicUser};
use vault_shared::types::ApiResponse;

use crate::services::session_service;
use crate::AppState;

pub async fn get_profile(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    let profile = session_service::get_profile(&state.store, user.id).await?;
    Ok(Json(ApiResponse::ok(profile)))
}
