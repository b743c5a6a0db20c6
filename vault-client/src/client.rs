//! HTTP client with session handling. A 401 on any call (other than the
//! refresh call itself) triggers exactly one shared refresh attempt; the
//! failing call is then retried once with the fresh token.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use vault_shared::types::auth::{AuthResponse, AuthStatus, PublicUser};
use vault_shared::types::{ApiErrorResponse, ApiResponse};

use crate::session::{MemoryTokenCache, SessionStore, TokenCache};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("session expired")]
    Unauthenticated,

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

/// Single-flight refresh as an explicit state machine. Callers arriving
/// while a refresh is in flight clone the shared handle and await the
/// same result instead of starting their own.
enum RefreshState {
    Idle,
    Refreshing(RefreshFuture),
}

struct Inner {
    http: reqwest::Client,
    base_url: Url,
    session: SessionStore,
    cache: Box<dyn TokenCache>,
    refresh: Mutex<RefreshState>,
}

/// Cheaply clonable handle; clones share session state and the refresh
/// state machine. The refresh envelope rides the cookie jar and is never
/// held in application state.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<Inner>,
}

impl AuthClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_cache(base_url, MemoryTokenCache::new())
    }

    pub fn with_cache(
        base_url: &str,
        cache: impl TokenCache + 'static,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: Url::parse(base_url)?,
                session: SessionStore::new(),
                cache: Box::new(cache),
                refresh: Mutex::new(RefreshState::Idle),
            }),
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn status(&self) -> AuthStatus {
        self.inner.session.status()
    }

    /// Restore the session at process start: a persisted access token is
    /// probed with a profile fetch before being trusted; failing that (or
    /// lacking one), a silent refresh runs off the durable cookie. Always
    /// concludes in a definite status, never `Loading`.
    pub async fn initialize(&self) -> AuthStatus {
        self.inner.session.set_loading();

        if let Some(token) = self.inner.cache.load() {
            self.inner.session.set_access_token(&token);
            match self.fetch_profile_once().await {
                Ok(user) => {
                    self.inner.session.set_auth(user, token);
                    return AuthStatus::Authenticated;
                }
                // Stale or revoked token; fall through to the refresh.
                Err(e) => tracing::debug!(error = %e, "persisted token probe failed"),
            }
        }

        if self.refresh_access_token().await.is_some() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<PublicUser, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint("/auth/register")?)
            .json(&json!({ "email": email, "password": password, "name": name }))
            .send()
            .await?;
        let auth: AuthResponse = Self::parse(response).await?;
        self.store_session(&auth);
        Ok(auth.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint("/auth/login")?)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let auth: AuthResponse = Self::parse(response).await?;
        self.store_session(&auth);
        Ok(auth.user)
    }

    /// Local state is cleared even when the server call fails; absence of
    /// a session is the steady state logout must reach either way.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.send_with_auth(Method::POST, "/auth/logout").await;
        self.inner.session.clear_auth();
        self.inner.cache.clear();
        let response = result?;
        Self::parse::<serde_json::Value>(response).await.map(|_| ())
    }

    pub async fn profile(&self) -> Result<PublicUser, ClientError> {
        let response = self.send_with_auth(Method::GET, "/auth/profile").await?;
        Self::parse(response).await
    }

    /// Browser entry point for the Google handshake, with a fresh CSRF
    /// state the caller should hold on to for the callback.
    pub fn google_auth_url(&self) -> Result<(Url, String), ClientError> {
        let state = Uuid::new_v4().to_string();
        let mut url = self.endpoint("/auth/google")?;
        url.query_pairs_mut().append_pair("state", &state);
        Ok((url, state))
    }

    /// Runs the shared refresh, returning the new access token on success.
    /// On failure all session state is cleared.
    pub async fn refresh_access_token(&self) -> Option<String> {
        let fut = {
            let mut state = self.inner.refresh.lock().unwrap();
            match &*state {
                RefreshState::Refreshing(fut) => fut.clone(),
                RefreshState::Idle => {
                    let client = self.clone();
                    let fut: RefreshFuture = async move {
                        let result = client.call_refresh().await;
                        let token = match result {
                            Ok(auth) => {
                                client
                                    .inner
                                    .session
                                    .set_auth(auth.user, auth.tokens.access_token.clone());
                                client.inner.cache.save(&auth.tokens.access_token);
                                Some(auth.tokens.access_token)
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "refresh failed, clearing session");
                                client.inner.session.clear_auth();
                                client.inner.cache.clear();
                                None
                            }
                        };
                        // Reset inside the future so a failed refresh can
                        // never wedge the state machine.
                        *client.inner.refresh.lock().unwrap() = RefreshState::Idle;
                        token
                    }
                    .boxed()
                    .shared();
                    *state = RefreshState::Refreshing(fut.clone());
                    fut
                }
            }
        };
        fut.await
    }

    /// The refresh call itself never re-enters the 401 handling.
    async fn call_refresh(&self) -> Result<AuthResponse, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint("/auth/refresh")?)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn send_with_auth(&self, method: Method, path: &str) -> Result<Response, ClientError> {
        let url = self.endpoint(path)?;
        let response = self
            .attach_bearer(self.inner.http.request(method.clone(), url.clone()))
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        match self.refresh_access_token().await {
            Some(token) => {
                let retry = self
                    .inner
                    .http
                    .request(method, url)
                    .bearer_auth(token)
                    .send()
                    .await?;
                Ok(retry)
            }
            None => Err(ClientError::Unauthenticated),
        }
    }

    /// Profile fetch without the 401-refresh path, used by `initialize`.
    async fn fetch_profile_once(&self) -> Result<PublicUser, ClientError> {
        let response = self
            .attach_bearer(self.inner.http.get(self.endpoint("/auth/profile")?))
            .send()
            .await?;
        Self::parse(response).await
    }

    fn attach_bearer(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.inner.session.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn store_session(&self, auth: &AuthResponse) {
        self.inner
            .session
            .set_auth(auth.user.clone(), auth.tokens.access_token.clone());
        self.inner.cache.save(&auth.tokens.access_token);
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.inner.base_url.join(path)?)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            let envelope: ApiResponse<T> = response.json().await?;
            return Ok(envelope.data);
        }
        match response.json::<ApiErrorResponse>().await {
            Ok(body) => Err(ClientError::Api {
                status: status.as_u16(),
                code: body.error.code,
                message: body.error.message,
            }),
            Err(_) => Err(ClientError::Api {
                status: status.as_u16(),
                code: "unknown".to_string(),
                message: status.to_string(),
            }),
        }
    }
}
