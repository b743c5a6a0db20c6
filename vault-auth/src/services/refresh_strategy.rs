//! Store-backed half of refresh verification. The envelope signature and
//! expiry are already checked at the transport edge before this runs; here
//! the embedded opaque id is resolved against the store, which is the
//! actual kill-switch. Revocation therefore takes effect immediately
//! without rotating signing keys.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use vault_shared::errors::{AppError, AppResult, ErrorCode};
use vault_shared::types::auth::RefreshClaims;

use crate::models::RefreshToken;
use crate::store::CredentialStore;

/// Outcome of a verified refresh envelope, consumed by the session
/// service's rotation step.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub user_id: Uuid,
    pub email: String,
    pub token_id: Uuid,
}

/// Record-level checks, factored out so they are testable without a store.
/// Record expiry is enforced independently of the envelope expiry.
pub fn check_refresh_record(
    record: &RefreshToken,
    claims: &RefreshClaims,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if record.revoked_at.is_some() {
        return Err(AppError::new(
            ErrorCode::RefreshTokenRevoked,
            "refresh token has been revoked",
        ));
    }
    if record.expires_at < now {
        return Err(AppError::new(
            ErrorCode::TokenExpired,
            "refresh token has expired",
        ));
    }
    if record.user_id != claims.sub {
        return Err(AppError::new(
            ErrorCode::RefreshTokenMismatch,
            "token mismatch",
        ));
    }
    Ok(())
}

pub async fn verify<S: CredentialStore>(
    store: &S,
    claims: &RefreshClaims,
) -> AppResult<RefreshSession> {
    let record = store
        .find_refresh_token(claims.token)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "invalid refresh token"))?;

    check_refresh_record(&record, claims, Utc::now())?;

    Ok(RefreshSession {
        user_id: claims.sub,
        email: claims.email.clone(),
        token_id: claims.token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(user_id: Uuid, token_id: Uuid) -> RefreshToken {
        RefreshToken {
            id: token_id,
            user_id,
            expires_at: Utc::now() + Duration::days(30),
            revoked_at: None,
            created_at: Utc::now(),
        }
    }

    fn claims(user_id: Uuid, token_id: Uuid) -> RefreshClaims {
        RefreshClaims::new(user_id, "a@example.com", token_id, 2_592_000)
    }

    #[test]
    fn valid_record_passes() {
        let (user_id, token_id) = (Uuid::new_v4(), Uuid::new_v4());
        let result = check_refresh_record(
            &record(user_id, token_id),
            &claims(user_id, token_id),
            Utc::now(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn revoked_record_is_rejected() {
        let (user_id, token_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut rec = record(user_id, token_id);
        rec.revoked_at = Some(Utc::now());
        let err =
            check_refresh_record(&rec, &claims(user_id, token_id), Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::RefreshTokenRevoked));
    }

    #[test]
    fn expired_record_is_rejected_independently_of_envelope() {
        let (user_id, token_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut rec = record(user_id, token_id);
        rec.expires_at = Utc::now() - Duration::minutes(1);
        // Envelope claims are still within their own expiry window.
        let err =
            check_refresh_record(&rec, &claims(user_id, token_id), Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenExpired));
    }

    #[test]
    fn foreign_owner_is_rejected() {
        let token_id = Uuid::new_v4();
        let err = check_refresh_record(
            &record(Uuid::new_v4(), token_id),
            &claims(Uuid::new_v4(), token_id),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::RefreshTokenMismatch));
    }

    #[tokio::test]
    async fn unknown_id_is_invalid() {
        let store = crate::store::memory::MemoryStore::new();
        let err = verify(&store, &claims(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenInvalid));
    }
}
