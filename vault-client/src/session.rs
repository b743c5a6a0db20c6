//! Owned session state with an explicit mutation API. All reads and writes
//! go through accessors so the storage backend stays swappable; nothing
//! here is an ambient global.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use vault_shared::types::auth::{AuthStatus, PublicUser};

#[derive(Debug, Clone)]
struct SessionState {
    user: Option<PublicUser>,
    access_token: Option<String>,
    status: AuthStatus,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            access_token: None,
            status: AuthStatus::Loading,
        }
    }
}

/// Process-local session state. Starts in `Loading` until the owning
/// client concludes initialization one way or the other.
#[derive(Debug, Default)]
pub struct SessionStore {
    state: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> AuthStatus {
        self.state.lock().unwrap().status
    }

    pub fn user(&self) -> Option<PublicUser> {
        self.state.lock().unwrap().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.lock().unwrap().access_token.clone()
    }

    pub fn set_auth(&self, user: PublicUser, access_token: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.user = Some(user);
        state.access_token = Some(access_token.into());
        state.status = AuthStatus::Authenticated;
    }

    pub fn set_access_token(&self, access_token: impl Into<String>) {
        self.state.lock().unwrap().access_token = Some(access_token.into());
    }

    pub fn set_user(&self, user: PublicUser) {
        self.state.lock().unwrap().user = Some(user);
    }

    pub fn set_loading(&self) {
        self.state.lock().unwrap().status = AuthStatus::Loading;
    }

    pub fn clear_auth(&self) {
        let mut state = self.state.lock().unwrap();
        state.user = None;
        state.access_token = None;
        state.status = AuthStatus::Unauthenticated;
    }
}

/// Persisted copy of the access token, surviving process restarts. The
/// refresh envelope never goes through here; it lives in the httpOnly
/// cookie jar.
pub trait TokenCache: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, access_token: &str);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    token: Mutex<Option<String>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for MemoryTokenCache {
    fn load(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn save(&self, access_token: &str) {
        *self.token.lock().unwrap() = Some(access_token.to_string());
    }

    fn clear(&self) {
        *self.token.lock().unwrap() = None;
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    access_token: String,
}

/// JSON-file-backed cache. Write failures are logged and otherwise
/// ignored; a lost cache only costs a silent refresh on next start.
#[derive(Debug)]
pub struct FileTokenCache {
    path: PathBuf,
}

impl FileTokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenCache for FileTokenCache {
    fn load(&self) -> Option<String> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        let cached: CachedSession = serde_json::from_str(&contents).ok()?;
        Some(cached.access_token)
    }

    fn save(&self, access_token: &str) {
        let cached = CachedSession {
            access_token: access_token.to_string(),
        };
        match serde_json::to_string(&cached) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(error = %e, path = %self.path.display(), "failed to persist session");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize session"),
        }
    }

    fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %self.path.display(), "failed to clear session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use vault_shared::types::auth::AuthProvider;

    fn user() -> PublicUser {
        PublicUser {
            id: Uuid::new_v4(),
            email: "alice@example.com".into(),
            name: None,
            avatar_url: None,
            provider: AuthProvider::Local,
            email_verified: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn starts_loading_and_transitions() {
        let store = SessionStore::new();
        assert_eq!(store.status(), AuthStatus::Loading);

        store.set_auth(user(), "tok");
        assert_eq!(store.status(), AuthStatus::Authenticated);
        assert_eq!(store.access_token().as_deref(), Some("tok"));

        store.clear_auth();
        assert_eq!(store.status(), AuthStatus::Unauthenticated);
        assert!(store.access_token().is_none());
        assert!(store.user().is_none());
    }

    #[test]
    fn file_cache_round_trips() {
        let dir = std::env::temp_dir().join(format!("vault-client-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let cache = FileTokenCache::new(dir.join("session.json"));

        assert!(cache.load().is_none());
        cache.save("tok123");
        assert_eq!(cache.load().as_deref(), Some("tok123"));
        cache.clear();
        assert!(cache.load().is_none());
        // Clearing twice is harmless.
        cache.clear();

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
