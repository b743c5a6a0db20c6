//! Session service: orchestrates registration, password and OAuth login,
//! rotation, and logout against the credential store and the token issuer.

use uuid::Uuid;

use vault_shared::errors::{AppError, AppResult, ErrorCode};
use vault_shared::types::auth::{AuthProvider, AuthResponse, PublicUser};

use crate::config::AppConfig;
use crate::models::{NewUser, User};
use crate::services::refresh_strategy::RefreshSession;
use crate::services::{auth_service, token_service};
use crate::store::CredentialStore;

/// Profile data handed back by the OAuth provider.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

pub async fn register<S: CredentialStore>(
    store: &S,
    config: &AppConfig,
    email: &str,
    password: &str,
    name: Option<String>,
) -> AppResult<AuthResponse> {
    if store.find_user_by_email(email).await?.is_some() {
        return Err(AppError::new(
            ErrorCode::EmailAlreadyExists,
            "email already registered",
        ));
    }

    let password_hash = auth_service::hash_password(password)?;
    let user = store
        .create_user(NewUser {
            email: email.to_string(),
            password_hash: Some(password_hash),
            name,
            avatar_url: None,
            provider: "local".to_string(),
            provider_id: None,
            email_verified: false,
        })
        .await?;

    let tokens = token_service::issue_tokens(store, config, user.id, &user.email).await?;

    tracing::info!(user_id = %user.id, email = %user.email, "user registered");

    Ok(AuthResponse {
        user: user.to_public(),
        tokens,
    })
}

/// Returns `None` for unknown email, OAuth-only accounts, and bad
/// passwords alike, so the login route can answer a uniform 401 without
/// leaking which check failed.
pub async fn validate_credentials<S: CredentialStore>(
    store: &S,
    email: &str,
    password: &str,
) -> AppResult<Option<User>> {
    let Some(user) = store.find_user_by_email(email).await? else {
        return Ok(None);
    };

    let Some(hash) = user.password_hash.as_deref() else {
        return Ok(None);
    };

    if !auth_service::verify_password(password, hash)? {
        return Ok(None);
    }

    Ok(Some(user))
}

/// Assumes the caller already validated credentials.
pub async fn login<S: CredentialStore>(
    store: &S,
    config: &AppConfig,
    user_id: Uuid,
) -> AppResult<AuthResponse> {
    let user = store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    let tokens = token_service::issue_tokens(store, config, user.id, &user.email).await?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(AuthResponse {
        user: user.to_public(),
        tokens,
    })
}

/// Resolves a Google identity to a user record.
///
/// An existing local account with the same email is upgraded in place:
/// first-party email ownership grants the OAuth identity control of that
/// account, and no duplicate is created. Unknown identities become new
/// Google users with the email already marked verified, since the
/// provider vouched for it.
pub async fn validate_oauth_user<S: CredentialStore>(
    store: &S,
    profile: OAuthProfile,
) -> AppResult<User> {
    let existing = store
        .find_user_by_google_or_email(&profile.provider_id, &profile.email)
        .await?;

    let user = match existing {
        Some(user) if user.provider() == AuthProvider::Local => {
            tracing::info!(user_id = %user.id, "linking google identity to local account");
            store
                .link_google_identity(
                    user.id,
                    &profile.provider_id,
                    profile.avatar_url.as_deref(),
                )
                .await?
        }
        Some(user) => user,
        None => {
            store
                .create_user(NewUser {
                    email: profile.email,
                    password_hash: None,
                    name: profile.name,
                    avatar_url: profile.avatar_url,
                    provider: "google".to_string(),
                    provider_id: Some(profile.provider_id),
                    email_verified: true,
                })
                .await?
        }
    };

    Ok(user)
}

/// Rotation: the old opaque id is revoked with a conditional write and a
/// brand-new pair is issued. If the conditional revoke did not transition
/// the record (a concurrent refresh won the race, or the id was already
/// dead), issuance is suppressed and the caller gets "revoked" -- at most
/// one of two racing refreshes yields a usable pair.
pub async fn refresh<S: CredentialStore>(
    store: &S,
    config: &AppConfig,
    session: &RefreshSession,
) -> AppResult<AuthResponse> {
    let user = store
        .find_user_by_id(session.user_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    let rotated = store.revoke_refresh_token(session.token_id).await?;
    if !rotated {
        return Err(AppError::new(
            ErrorCode::RefreshTokenRevoked,
            "refresh token has been revoked",
        ));
    }

    let tokens = token_service::issue_tokens(store, config, user.id, &user.email).await?;

    Ok(AuthResponse {
        user: user.to_public(),
        tokens,
    })
}

/// With a token id: revoke that one session, scoped to the user. Without:
/// global sign-out, revoking every active token the user holds.
pub async fn logout<S: CredentialStore>(
    store: &S,
    user_id: Uuid,
    token_id: Option<Uuid>,
) -> AppResult<()> {
    match token_id {
        Some(id) => {
            store.revoke_user_refresh_token(user_id, id).await?;
        }
        None => {
            let revoked = store.revoke_all_refresh_tokens(user_id).await?;
            tracing::info!(user_id = %user_id, revoked, "global sign-out");
        }
    }
    Ok(())
}

pub async fn get_profile<S: CredentialStore>(store: &S, user_id: Uuid) -> AppResult<PublicUser> {
    let user = store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;
    Ok(user.to_public())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{refresh_strategy, token_service};
    use crate::store::memory::MemoryStore;

    fn config() -> AppConfig {
        AppConfig::for_tests()
    }

    async fn decode_and_verify(
        store: &MemoryStore,
        config: &AppConfig,
        envelope: &str,
    ) -> AppResult<RefreshSession> {
        let claims = token_service::decode_refresh_envelope(envelope, &config.jwt_secret)?;
        refresh_strategy::verify(store, &claims).await
    }

    #[tokio::test]
    async fn register_is_unique_per_email() {
        let store = MemoryStore::new();
        let config = config();

        let first = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();
        assert_eq!(first.user.email, "alice@example.com");
        assert_eq!(first.user.provider, AuthProvider::Local);

        let err = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::EmailAlreadyExists));
    }

    #[tokio::test]
    async fn emails_are_matched_exactly_as_stored() {
        let store = MemoryStore::new();
        let config = config();
        register(&store, &config, "Alice@example.com", "Passw0rd", None)
            .await
            .unwrap();

        // A differently-cased address is a distinct account, not a conflict.
        let second = register(&store, &config, "alice@example.com", "Passw0rd", None).await;
        assert!(second.is_ok());

        // Credential lookup is exact-match as well.
        assert!(validate_credentials(&store, "ALICE@EXAMPLE.COM", "Passw0rd")
            .await
            .unwrap()
            .is_none());

        // OAuth email linking only matches the exact stored address.
        let oauth_user = validate_oauth_user(
            &store,
            OAuthProfile {
                provider_id: "g777".into(),
                email: "ALICE@example.com".into(),
                name: None,
                avatar_url: None,
            },
        )
        .await
        .unwrap();
        assert_ne!(oauth_user.email, "Alice@example.com");
        assert_ne!(oauth_user.email, "alice@example.com");
    }

    #[tokio::test]
    async fn validate_credentials_returns_none_not_errors() {
        let store = MemoryStore::new();
        let config = config();
        register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();

        // Unknown email.
        assert!(validate_credentials(&store, "bob@example.com", "Passw0rd")
            .await
            .unwrap()
            .is_none());

        // Wrong password.
        assert!(validate_credentials(&store, "alice@example.com", "nope1234")
            .await
            .unwrap()
            .is_none());

        // OAuth-only account has no hash to compare against.
        validate_oauth_user(
            &store,
            OAuthProfile {
                provider_id: "g999".into(),
                email: "carol@example.com".into(),
                name: None,
                avatar_url: None,
            },
        )
        .await
        .unwrap();
        assert!(validate_credentials(&store, "carol@example.com", "anything1")
            .await
            .unwrap()
            .is_none());

        // The happy path still works.
        assert!(validate_credentials(&store, "alice@example.com", "Passw0rd")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn issued_pair_verifies_to_the_same_subject() {
        let store = MemoryStore::new();
        let config = config();
        let auth = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();

        let session = decode_and_verify(&store, &config, &auth.tokens.refresh_token)
            .await
            .unwrap();
        assert_eq!(session.user_id, auth.user.id);
        assert_eq!(session.email, "alice@example.com");
    }

    #[tokio::test]
    async fn rotation_revokes_old_and_mints_fresh_id() {
        let store = MemoryStore::new();
        let config = config();
        let a1 = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();

        let s1 = decode_and_verify(&store, &config, &a1.tokens.refresh_token)
            .await
            .unwrap();
        let a2 = refresh(&store, &config, &s1).await.unwrap();

        // Rotation invariant: the new envelope embeds a different opaque id.
        let s2 = decode_and_verify(&store, &config, &a2.tokens.refresh_token)
            .await
            .unwrap();
        assert_ne!(s2.token_id, s1.token_id);

        // A1 is now revoked; the strategy rejects it before the service runs.
        let err = decode_and_verify(&store, &config, &a1.tokens.refresh_token)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::RefreshTokenRevoked));

        // A2 still refreshes.
        assert!(refresh(&store, &config, &s2).await.is_ok());
    }

    #[tokio::test]
    async fn losing_the_rotation_race_issues_nothing() {
        let store = MemoryStore::new();
        let config = config();
        let auth = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();
        let session = decode_and_verify(&store, &config, &auth.tokens.refresh_token)
            .await
            .unwrap();

        // Both callers passed strategy verification with the same id; only
        // the first conditional revoke wins.
        let winner = refresh(&store, &config, &session).await;
        assert!(winner.is_ok());

        let before = store.active_token_count(auth.user.id);
        let loser = refresh(&store, &config, &session).await.unwrap_err();
        assert_eq!(loser.code(), Some(ErrorCode::RefreshTokenRevoked));
        assert_eq!(store.active_token_count(auth.user.id), before);
    }

    #[tokio::test]
    async fn refresh_for_unknown_user_fails() {
        let store = MemoryStore::new();
        let config = config();
        let session = RefreshSession {
            user_id: Uuid::new_v4(),
            email: "ghost@example.com".into(),
            token_id: Uuid::new_v4(),
        };
        let err = refresh(&store, &config, &session).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UserNotFound));
    }

    #[tokio::test]
    async fn oauth_login_links_existing_local_account() {
        let store = MemoryStore::new();
        let config = config();
        let local = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();

        let linked = validate_oauth_user(
            &store,
            OAuthProfile {
                provider_id: "g123".into(),
                email: "alice@example.com".into(),
                name: Some("Alice".into()),
                avatar_url: Some("https://lh3.example.com/a.png".into()),
            },
        )
        .await
        .unwrap();

        // Same account, upgraded in place.
        assert_eq!(linked.id, local.user.id);
        assert_eq!(linked.provider(), AuthProvider::Google);
        assert!(linked.email_verified);
        assert_eq!(linked.avatar_url.as_deref(), Some("https://lh3.example.com/a.png"));
        // The password stays, so the account keeps both credentials.
        assert!(linked.password_hash.is_some());

        // A second OAuth login resolves to the same record unchanged.
        let again = validate_oauth_user(
            &store,
            OAuthProfile {
                provider_id: "g123".into(),
                email: "alice@example.com".into(),
                name: None,
                avatar_url: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(again.id, local.user.id);
    }

    #[tokio::test]
    async fn oauth_login_creates_verified_google_user() {
        let store = MemoryStore::new();
        let user = validate_oauth_user(
            &store,
            OAuthProfile {
                provider_id: "g456".into(),
                email: "dave@example.com".into(),
                name: Some("Dave".into()),
                avatar_url: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(user.provider(), AuthProvider::Google);
        assert!(user.email_verified);
        assert!(user.password_hash.is_none());
        assert_eq!(user.provider_id.as_deref(), Some("g456"));
    }

    #[tokio::test]
    async fn scoped_logout_only_kills_the_given_session() {
        let store = MemoryStore::new();
        let config = config();
        let auth = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();
        let second = login(&store, &config, auth.user.id).await.unwrap();
        assert_eq!(store.active_token_count(auth.user.id), 2);

        let s1 = decode_and_verify(&store, &config, &auth.tokens.refresh_token)
            .await
            .unwrap();
        logout(&store, auth.user.id, Some(s1.token_id)).await.unwrap();

        assert_eq!(store.active_token_count(auth.user.id), 1);
        let err = decode_and_verify(&store, &config, &auth.tokens.refresh_token)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::RefreshTokenRevoked));
        assert!(decode_and_verify(&store, &config, &second.tokens.refresh_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn scoped_logout_ignores_tokens_of_other_users() {
        let store = MemoryStore::new();
        let config = config();
        let alice = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();
        let bob = register(&store, &config, "bob@example.com", "Passw0rd", None)
            .await
            .unwrap();

        let bob_session = decode_and_verify(&store, &config, &bob.tokens.refresh_token)
            .await
            .unwrap();

        // Alice naming Bob's token id must not revoke it.
        logout(&store, alice.user.id, Some(bob_session.token_id))
            .await
            .unwrap();
        assert_eq!(store.active_token_count(bob.user.id), 1);
    }

    #[tokio::test]
    async fn global_logout_revokes_every_active_session() {
        let store = MemoryStore::new();
        let config = config();
        let auth = register(&store, &config, "alice@example.com", "Passw0rd", None)
            .await
            .unwrap();
        let second = login(&store, &config, auth.user.id).await.unwrap();
        let third = login(&store, &config, auth.user.id).await.unwrap();
        assert_eq!(store.active_token_count(auth.user.id), 3);

        logout(&store, auth.user.id, None).await.unwrap();
        assert_eq!(store.active_token_count(auth.user.id), 0);

        for envelope in [
            &auth.tokens.refresh_token,
            &second.tokens.refresh_token,
            &third.tokens.refresh_token,
        ] {
            let err = decode_and_verify(&store, &config, envelope).await.unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::RefreshTokenRevoked));
        }
    }

    #[tokio::test]
    async fn profile_projection_never_carries_the_hash() {
        let store = MemoryStore::new();
        let config = config();
        let auth = register(&store, &config, "alice@example.com", "Passw0rd", Some("Alice".into()))
            .await
            .unwrap();

        let profile = get_profile(&store, auth.user.id).await.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alice"));

        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("password_hash").is_none());

        let err = get_profile(&store, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UserNotFound));
    }
}
