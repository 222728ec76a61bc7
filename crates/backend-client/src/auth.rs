//! Identity provider: sessions and auth-state changes
//!
//! Wraps the backend's auth endpoints (password grant, signup, logout) behind
//! the [`IdentityProvider`] trait. Sign-in and sign-out fan out as
//! [`AuthEvent`]s on a broadcast channel so the session layer can react
//! without polling, and the shared [`TokenStore`] is kept in step so the REST
//! and blob clients pick up the caller's bearer token.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::config::BackendConfig;
use crate::TokenStore;

/// Capacity of the auth-event broadcast channel.
const AUTH_EVENT_CAPACITY: usize = 16;

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Wrong email or password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration with an email that already has an account.
    #[error("email already registered")]
    AlreadyRegistered,

    /// Signup accepted but no session issued (email confirmation pending).
    #[error("account created; email confirmation required")]
    ConfirmationRequired,

    /// Any other non-success response.
    #[error("auth error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the backend.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque user identifier assigned by the identity provider.
    pub user_id: String,
    /// Email the account was registered with.
    pub email: String,
    /// Bearer token for subsequent calls.
    pub access_token: String,
}

/// Session-change events.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// A session was established.
    SignedIn(Session),
    /// The session ended.
    SignedOut,
}

/// The identity provider at its interface boundary.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, if any.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Register a new account.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session>;

    /// End the current session.
    async fn sign_out(&self) -> Result<()>;

    /// Subscribe to session-change events.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    user: Option<AuthUser>,
}

/// HTTP-backed identity provider.
pub struct AuthClient {
    http: reqwest::Client,
    config: BackendConfig,
    token: TokenStore,
    session: Arc<RwLock<Option<Session>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthClient {
    /// Create a client from a config and the shared token store.
    pub fn new(config: BackendConfig, token: TokenStore) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_default();
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            http,
            config,
            token,
            session: Arc::new(RwLock::new(None)),
            events,
        }
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.config.service_url(), endpoint)
    }

    async fn grant(&self, url: String, email: &str, password: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(url)
            .header("apikey", self.config.api_key())
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::map_error(status.as_u16(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn map_error(status: u16, body: String) -> AuthError {
        match status {
            400 | 401 if body.contains("already registered") => AuthError::AlreadyRegistered,
            400 | 401 => AuthError::InvalidCredentials,
            422 => AuthError::AlreadyRegistered,
            _ => AuthError::Api {
                status,
                message: body,
            },
        }
    }

    async fn establish(&self, response: TokenResponse) -> Result<Session> {
        let access_token = response
            .access_token
            .ok_or(AuthError::ConfirmationRequired)?;
        let user = response.user.ok_or(AuthError::ConfirmationRequired)?;

        let session = Session {
            user_id: user.id,
            email: user.email.unwrap_or_default(),
            access_token: access_token.clone(),
        };

        *self.token.write().await = Some(access_token);
        *self.session.write().await = Some(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for AuthClient {
    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.session.read().await.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.auth_url("token?grant_type=password");
        let response = self.grant(url, email, password).await?;
        self.establish(response).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.auth_url("signup");
        let response = self.grant(url, email, password).await?;
        self.establish(response).await
    }

    async fn sign_out(&self) -> Result<()> {
        let bearer = self.token.read().await.clone();
        if let Some(bearer) = bearer {
            let response = self
                .http
                .post(self.auth_url("logout"))
                .header("apikey", self.config.api_key())
                .bearer_auth(bearer)
                .send()
                .await?;
            if !response.status().is_success() {
                tracing::warn!(
                    status = response.status().as_u16(),
                    "logout rejected by backend; clearing local session anyway"
                );
            }
        }

        *self.token.write().await = None;
        *self.session.write().await = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
