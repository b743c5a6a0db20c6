use axum::Json;
use vault_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("vault-auth", env!("CARGO_PKG_VERSION")))
}
