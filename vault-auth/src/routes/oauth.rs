use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use vault_shared::errors::{AppError, AppResult, ErrorCode};

use crate::routes::cookies;
use crate::services::session_service::{self, OAuthProfile};
use crate::AppState;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

#[derive(Debug, Default, Deserialize)]
pub struct AuthParams {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    #[serde(alias = "sub")]
    id: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

/// Kicks off the handshake: redirect the browser to Google's consent
/// screen, passing the caller's CSRF state through untouched.
pub async fn google_auth(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthParams>,
) -> AppResult<Redirect> {
    let mut url = Url::parse(GOOGLE_AUTH_URL).map_err(|e| AppError::internal(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("client_id", &state.config.google_client_id)
        .append_pair("redirect_uri", &state.config.google_redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", "openid email profile");
    if let Some(csrf_state) = params.state {
        url.query_pairs_mut().append_pair("state", &csrf_state);
    }
    Ok(Redirect::to(url.as_str()))
}

/// Completes the handshake: exchange the code, fetch the profile, resolve
/// or create the account, then bounce to the frontend with the access
/// token in the query string and the refresh envelope in the cookie.
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> AppResult<impl IntoResponse> {
    let google_user = fetch_google_user(&state, &params.code).await?;

    let user = session_service::validate_oauth_user(
        &state.store,
        OAuthProfile {
            provider_id: google_user.id,
            email: google_user.email,
            name: google_user.name,
            avatar_url: google_user.picture,
        },
    )
    .await?;

    let result = session_service::login(&state.store, &state.config, user.id).await?;

    tracing::info!(user_id = %user.id, "google oauth login");

    let cookie = cookies::refresh_cookie(&result.tokens.refresh_token, state.config.cookie_secure)
        .map_err(|e| AppError::internal(e.to_string()))?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    let mut redirect_url = Url::parse(&state.config.frontend_url)
        .map_err(|e| AppError::internal(e.to_string()))?
        .join("/auth/callback")
        .map_err(|e| AppError::internal(e.to_string()))?;
    redirect_url
        .query_pairs_mut()
        .append_pair("access_token", &result.tokens.access_token);
    if let Some(csrf_state) = params.state {
        redirect_url
            .query_pairs_mut()
            .append_pair("state", &csrf_state);
    }

    Ok((headers, Redirect::to(redirect_url.as_str())))
}

async fn fetch_google_user(state: &AppState, code: &str) -> AppResult<GoogleUserInfo> {
    let client = reqwest::Client::new();
    let token_response = client
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("code", code),
            ("client_id", state.config.google_client_id.as_str()),
            ("client_secret", state.config.google_client_secret.as_str()),
            ("redirect_uri", state.config.google_redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| {
            AppError::new(ErrorCode::OAuthError, format!("google token exchange failed: {e}"))
        })?;

    if !token_response.status().is_success() {
        let body = token_response.text().await.unwrap_or_default();
        return Err(AppError::new(
            ErrorCode::OAuthError,
            format!("google token error: {body}"),
        ));
    }

    let google_token: GoogleTokenResponse = token_response.json().await.map_err(|e| {
        AppError::new(ErrorCode::OAuthError, format!("invalid token response: {e}"))
    })?;

    let user_info_response = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&google_token.access_token)
        .send()
        .await
        .map_err(|e| {
            AppError::new(ErrorCode::OAuthError, format!("google userinfo failed: {e}"))
        })?;

    user_info_response.json().await.map_err(|e| {
        AppError::new(ErrorCode::OAuthError, format!("invalid userinfo response: {e}"))
    })
}
