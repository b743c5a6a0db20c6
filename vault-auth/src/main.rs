use axum::{
    routing::{get, post},
    Router,
};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod models;
mod routes;
mod schema;
mod services;
mod store;

use config::AppConfig;
use store::PgStore;

pub struct AppState {
    pub store: PgStore,
    pub config: AppConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vault_shared::middleware::init_tracing("vault-auth");

    let config = AppConfig::load()?;
    let port = config.port;

    let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
    let pool = Pool::builder().max_size(10).build(manager)?;

    let state = Arc::new(AppState {
        store: PgStore::new(pool),
        config,
    });

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/auth/register", post(routes::register::register))
        .route("/auth/login", post(routes::login::login))
        .route("/auth/refresh", post(routes::refresh::refresh_token))
        .route("/auth/logout", post(routes::logout::logout))
        .route("/auth/profile", get(routes::profile::get_profile))
        .route("/auth/google", get(routes::oauth::google_auth))
        .route("/auth/google/callback", get(routes::oauth::google_callback))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "vault-auth starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
