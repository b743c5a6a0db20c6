//! Token issuer: signs access tokens and mints opaque refresh ids wrapped
//! in a signed envelope. The opaque id is the only thing persisted; the
//! envelope is what the client carries.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use vault_shared::errors::{AppError, AppResult, ErrorCode};
use vault_shared::types::auth::{AccessClaims, RefreshClaims, TokenPair};

use crate::config::AppConfig;
use crate::models::NewRefreshToken;
use crate::store::CredentialStore;

pub fn sign_access_token(
    user_id: Uuid,
    email: &str,
    secret: &str,
    ttl_secs: i64,
) -> AppResult<String> {
    let claims = AccessClaims::new(user_id, email, ttl_secs);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("JWT encoding failed: {e}")))
}

pub fn sign_refresh_envelope(
    user_id: Uuid,
    email: &str,
    token_id: Uuid,
    secret: &str,
    ttl_secs: i64,
) -> AppResult<String> {
    let claims = RefreshClaims::new(user_id, email, token_id, ttl_secs);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("JWT encoding failed: {e}")))
}

/// Signature and envelope-expiry check. This is the cheap stateless half of
/// refresh verification; the store-backed half lives in `refresh_strategy`.
pub fn decode_refresh_envelope(envelope: &str, secret: &str) -> AppResult<RefreshClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<RefreshClaims>(
        envelope,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "refresh token expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, "invalid refresh token"),
    })
}

/// Issues a fresh token pair: one persisted refresh record, no other side
/// effects. Store failures propagate to the caller untouched.
pub async fn issue_tokens<S: CredentialStore>(
    store: &S,
    config: &AppConfig,
    user_id: Uuid,
    email: &str,
) -> AppResult<TokenPair> {
    let access_token =
        sign_access_token(user_id, email, &config.jwt_secret, config.jwt_access_ttl)?;

    let opaque_id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::seconds(config.jwt_refresh_ttl);
    store
        .insert_refresh_token(NewRefreshToken {
            id: opaque_id,
            user_id,
            expires_at,
        })
        .await?;

    let refresh_token = sign_refresh_envelope(
        user_id,
        email,
        opaque_id,
        &config.jwt_secret,
        config.jwt_refresh_ttl,
    )?;

    Ok(TokenPair::new(
        access_token,
        refresh_token,
        config.jwt_access_ttl,
    ))
}
