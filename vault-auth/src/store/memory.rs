//! In-memory credential store used by the session service tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use vault_shared::errors::AppResult;

use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};
use crate::store::CredentialStore;

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    tokens: Mutex<HashMap<Uuid, RefreshToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: how many usable tokens the user currently holds.
    pub fn active_token_count(&self, user_id: Uuid) -> usize {
        self.tokens
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id && t.revoked_at.is_none() && t.expires_at > Utc::now())
            .count()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_google_or_email(
        &self,
        provider_id: &str,
        email: &str,
    ) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| {
                (u.provider == "google" && u.provider_id.as_deref() == Some(provider_id))
                    || u.email == email
            })
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            name: new_user.name,
            avatar_url: new_user.avatar_url,
            provider: new_user.provider,
            provider_id: new_user.provider_id,
            email_verified: new_user.email_verified,
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().insert(user.id, user.clone());
        Ok(user)
    }

    async fn link_google_identity(
        &self,
        user_id: Uuid,
        provider_id: &str,
        avatar_url: Option<&str>,
    ) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&user_id).expect("link target must exist");
        user.provider = "google".to_string();
        user.provider_id = Some(provider_id.to_string());
        user.email_verified = true;
        if let Some(avatar) = avatar_url {
            user.avatar_url = Some(avatar.to_string());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> AppResult<RefreshToken> {
        let record = RefreshToken {
            id: token.id,
            user_id: token.user_id,
            expires_at: token.expires_at,
            revoked_at: None,
            created_at: Utc::now(),
        };
        self.tokens.lock().unwrap().insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_refresh_token(&self, id: Uuid) -> AppResult<Option<RefreshToken>> {
        Ok(self.tokens.lock().unwrap().get(&id).cloned())
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> AppResult<bool> {
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get_mut(&id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_refresh_token(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get_mut(&id) {
            Some(token) if token.user_id == user_id && token.revoked_at.is_none() => {
                token.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> AppResult<usize> {
        let mut tokens = self.tokens.lock().unwrap();
        let mut revoked = 0;
        for token in tokens.values_mut() {
            if token.user_id == user_id && token.revoked_at.is_none() {
                token.revoked_at = Some(Utc::now());
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
