//! Authentication Module
//!
//! Token state and the single-flight refresh gate.
//!
//! When a request comes back 401 the caller asks the [`AuthGate`] for a token
//! to replay with. The first caller to arrive while no refresh is running
//! performs the refresh itself; callers arriving during the refresh park on a
//! oneshot channel and are woken, in arrival order, only after the new tokens
//! have been persisted. If the refresh fails the parked callers are dropped
//! without being replayed, the session is cleared and a single
//! [`SessionEvent::LoggedOut`] is broadcast.

use crate::client::config::Config;
use crate::client::local_db::{load_json, save_json, KeyValueStore};
use crate::client::transport::{ApiRequest, Method, RequestBody, Transport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, Mutex};

/// Storage key for the persisted tokens
pub const TOKEN_KEY: &str = "login_token";

const EVENT_CAPACITY: usize = 16;

/// Access/refresh token pair plus the account they belong to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
}

/// Authentication errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid account or password")]
    InvalidCredentials,

    #[error("account locked: {0}")]
    AccountLocked(String),

    #[error("password expired")]
    PasswordExpired,

    /// Refresh failed or the replay was rejected again; log in again
    #[error("session expired, please log in again")]
    SessionExpired,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("token storage failed: {0}")]
    Storage(String),

    #[error("unexpected login response: {0}")]
    UnexpectedResponse(String),
}

impl AuthError {
    /// Map a login endpoint 401 body onto a credential error
    pub fn from_login_rejection(body: &str) -> Self {
        let body = body.trim();
        if body.contains("Account locked") {
            AuthError::AccountLocked(body.to_string())
        } else if body == "Password expired" {
            AuthError::PasswordExpired
        } else {
            AuthError::InvalidCredentials
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    RefreshFailed,
}

/// Session lifecycle notifications
///
/// `LoggedOut { reason: RefreshFailed }` is the signal to send the user back
/// to the login screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { account_number: Option<String> },
    TokensRefreshed,
    LoggedOut { reason: LogoutReason },
}

/// Persisted token state
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<AuthTokens>>,
}

impl TokenStore {
    /// Empty token state backed by `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    /// Token state restored from `store`
    pub async fn restore(store: Arc<dyn KeyValueStore>) -> Self {
        let tokens: Option<AuthTokens> = match load_json(store.as_ref(), TOKEN_KEY).await {
            Ok(tokens) => tokens,
            Err(e) => {
                // Signed out is recoverable by logging in again
                tracing::warn!("[AUTH] failed to read saved session: {}", e);
                None
            }
        };
        if tokens.is_some() {
            tracing::debug!("[AUTH] restored saved session");
        }
        Self {
            store,
            current: RwLock::new(tokens),
        }
    }

    pub fn tokens(&self) -> Option<AuthTokens> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens()
            .map(|t| t.access_token)
            .filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens()
            .map(|t| t.refresh_token)
            .filter(|t| !t.is_empty())
    }

    pub fn is_logged_in(&self) -> bool {
        self.access_token().is_some()
    }

    /// Persist, then publish, new tokens
    pub async fn save(&self, tokens: AuthTokens) -> Result<(), AuthError> {
        save_json(self.store.as_ref(), TOKEN_KEY, &tokens)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
        Ok(())
    }

    /// Forget the session in memory and on disk
    pub async fn clear(&self) -> Result<(), AuthError> {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.store
            .remove(TOKEN_KEY)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))
    }
}

/// Refresh latch state
enum Phase {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<String>>,
    },
}

/// Single-flight token refresh gate
pub struct AuthGate {
    config: Config,
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    phase: Mutex<Phase>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthGate {
    pub fn new(config: Config, transport: Arc<dyn Transport>, tokens: Arc<TokenStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            transport,
            tokens,
            phase: Mutex::new(Phase::Idle),
            events,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn notify(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Token to replay a request with after it was rejected with 401
    ///
    /// `used_token` is the token the rejected request carried. If the current
    /// token already differs, another request refreshed in the meantime and
    /// the current token is returned straight away.
    pub async fn token_after_unauthorized(
        &self,
        used_token: Option<&str>,
    ) -> Result<String, AuthError> {
        let waiter = {
            let mut phase = self.phase.lock().await;
            match &mut *phase {
                Phase::Refreshing { waiters } => {
                    let (sender, receiver) = oneshot::channel();
                    waiters.push(sender);
                    tracing::debug!("[AUTH] refresh in flight, {} request(s) waiting", waiters.len());
                    Some(receiver)
                }
                Phase::Idle => {
                    if let Some(current) = self.tokens.access_token() {
                        if used_token != Some(current.as_str()) {
                            tracing::debug!("[AUTH] token already rotated, replaying");
                            return Ok(current);
                        }
                    }
                    *phase = Phase::Refreshing {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        match waiter {
            // A dropped sender means the refresh failed
            Some(receiver) => receiver.await.map_err(|_| AuthError::SessionExpired),
            None => self.lead_refresh().await,
        }
    }

    async fn lead_refresh(&self) -> Result<String, AuthError> {
        let mut guard = RefreshGuard {
            phase: &self.phase,
            armed: true,
        };
        tracing::info!("[AUTH] access token expired, refreshing");
        let outcome = self.refresh().await;

        let waiters = {
            let mut phase = self.phase.lock().await;
            guard.armed = false;
            match std::mem::replace(&mut *phase, Phase::Idle) {
                Phase::Refreshing { waiters } => waiters,
                Phase::Idle => Vec::new(),
            }
        };

        match outcome {
            Ok(token) => {
                tracing::info!("[AUTH] token refreshed, replaying {} waiting request(s)", waiters.len());
                for waiter in waiters {
                    let _ = waiter.send(token.clone());
                }
                self.notify(SessionEvent::TokensRefreshed);
                Ok(token)
            }
            Err(e) => {
                tracing::error!(
                    "[AUTH] token refresh failed ({}), dropping {} waiting request(s)",
                    e,
                    waiters.len()
                );
                drop(waiters);
                self.end_session(LogoutReason::RefreshFailed).await;
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// Call the refresh endpoint and persist the new pair
    async fn refresh(&self) -> Result<String, AuthError> {
        let previous = self.tokens.tokens();
        let refresh_token = previous
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NotLoggedIn)?;

        let request = ApiRequest {
            url: self.config.refresh_url(),
            method: Method::Post,
            body: RequestBody::Json(json!({ "refreshToken": refresh_token })),
            bearer: None,
        };
        let response = self
            .transport
            .request(request)
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;
        if response.status != 200 {
            return Err(AuthError::RefreshFailed(format!("status {}", response.status)));
        }

        let mut tokens: AuthTokens = serde_json::from_value(response.body)
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;
        tokens.account_number = previous.and_then(|t| t.account_number);
        let access_token = tokens.access_token.clone();
        self.tokens.save(tokens).await?;
        Ok(access_token)
    }

    async fn end_session(&self, reason: LogoutReason) {
        if let Err(e) = self.tokens.clear().await {
            tracing::warn!("[AUTH] failed to clear tokens: {}", e);
        }
        self.notify(SessionEvent::LoggedOut { reason });
    }

    /// User-initiated logout
    pub async fn logout(&self) {
        tracing::info!("[AUTH] logging out");
        self.end_session(LogoutReason::UserRequested).await;
    }
}

/// Returns the latch to idle if a refresh is abandoned mid-flight
struct RefreshGuard<'a> {
    phase: &'a Mutex<Phase>,
    armed: bool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut phase) = self.phase.try_lock() {
                *phase = Phase::Idle;
            }
        }
    }
}
