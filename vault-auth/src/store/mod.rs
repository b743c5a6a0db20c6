//! Credential store: the persistence seam for user and refresh-token
//! records. The session service only talks to this trait, so the backing
//! store (Postgres in production, in-memory in tests) is swappable.

use async_trait::async_trait;
use uuid::Uuid;

use vault_shared::errors::AppResult;

use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};

pub mod postgres;

#[cfg(test)]
pub mod memory;

pub use postgres::PgStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Lookup used by the OAuth flow: matches either the Google identity or
    /// a plain email match, so a local account can be linked in place.
    async fn find_user_by_google_or_email(
        &self,
        provider_id: &str,
        email: &str,
    ) -> AppResult<Option<User>>;

    async fn create_user(&self, new_user: NewUser) -> AppResult<User>;

    /// Upgrades an account to Google control: sets the provider identity,
    /// marks the email verified, and overwrites the avatar when one is given.
    async fn link_google_identity(
        &self,
        user_id: Uuid,
        provider_id: &str,
        avatar_url: Option<&str>,
    ) -> AppResult<User>;

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> AppResult<RefreshToken>;

    async fn find_refresh_token(&self, id: Uuid) -> AppResult<Option<RefreshToken>>;

    /// Conditional revoke: only transitions `revoked_at` from null to now.
    /// Returns whether this call performed the transition, which lets a
    /// refresh that lost a rotation race detect it and suppress issuance.
    async fn revoke_refresh_token(&self, id: Uuid) -> AppResult<bool>;

    /// Scoped revoke: ignores tokens owned by other users even when the id
    /// matches.
    async fn revoke_user_refresh_token(&self, user_id: Uuid, id: Uuid) -> AppResult<bool>;

    /// Revokes every active token for the user. Returns how many were hit.
    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> AppResult<usize>;
}
