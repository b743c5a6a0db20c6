use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use uuid::Uuid;

use vault_shared::errors::{AppError, AppResult};

use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};
use crate::schema::{refresh_tokens, users};
use crate::store::CredentialStore;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<PooledConnection<ConnectionManager<PgConnection>>> {
        self.pool.get().map_err(|e| AppError::internal(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table.find(id).first(&mut conn).optional()?)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::email.eq(email))
            .first(&mut conn)
            .optional()?)
    }

    async fn find_user_by_google_or_email(
        &self,
        provider_id: &str,
        email: &str,
    ) -> AppResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(
                users::provider
                    .eq("google")
                    .and(users::provider_id.eq(provider_id))
                    .or(users::email.eq(email)),
            )
            .first(&mut conn)
            .optional()?)
    }

    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(users::table)
            .values(&new_user)
            .get_result(&mut conn)?)
    }

    async fn link_google_identity(
        &self,
        user_id: Uuid,
        provider_id: &str,
        avatar_url: Option<&str>,
    ) -> AppResult<User> {
        let mut conn = self.conn()?;
        let user: User = diesel::update(users::table.find(user_id))
            .set((
                users::provider.eq("google"),
                users::provider_id.eq(provider_id),
                users::email_verified.eq(true),
                users::updated_at.eq(Utc::now()),
            ))
            .get_result(&mut conn)?;

        // Avatar is only overwritten when the provider supplied one.
        if let Some(avatar) = avatar_url {
            let user: User = diesel::update(users::table.find(user_id))
                .set(users::avatar_url.eq(avatar))
                .get_result(&mut conn)?;
            return Ok(user);
        }
        Ok(user)
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> AppResult<RefreshToken> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(refresh_tokens::table)
            .values(&token)
            .get_result(&mut conn)?)
    }

    async fn find_refresh_token(&self, id: Uuid) -> AppResult<Option<RefreshToken>> {
        let mut conn = self.conn()?;
        Ok(refresh_tokens::table
            .find(id)
            .first(&mut conn)
            .optional()?)
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            refresh_tokens::table
                .find(id)
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
        .execute(&mut conn)?;
        Ok(updated > 0)
    }

    async fn revoke_user_refresh_token(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            refresh_tokens::table
                .find(id)
                .filter(refresh_tokens::user_id.eq(user_id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
        .execute(&mut conn)?;
        Ok(updated > 0)
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> AppResult<usize> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::user_id.eq(user_id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
        .execute(&mut conn)?)
    }
}
