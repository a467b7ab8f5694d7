//! API client
//!
//! Wraps a [`Transport`] with the session rules every call shares: attach the
//! bearer token unless the path is auth-exempt, route 401s through the
//! [`AuthGate`] and replay once, and turn login 401s into credential errors.

use crate::client::auth::{AuthError, AuthGate, AuthTokens, SessionEvent};
use crate::client::config::Config;
use crate::client::transport::{
    ApiRequest, ApiResponse, Method, RequestBody, Transport, TransportError, UploadRequest,
};
use crate::shared::form::FilePart;
use std::sync::Arc;
use thiserror::Error;

/// API call errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// The session is gone; nothing further will succeed until login
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::Auth(AuthError::SessionExpired))
    }
}

/// What to send, independent of the token it goes out with
#[derive(Debug, Clone)]
enum Outgoing {
    Request { method: Method, body: RequestBody },
    Upload { files: Vec<FilePart>, form: Vec<(String, String)> },
}

/// Session-aware API client
pub struct ApiClient {
    config: Config,
    transport: Arc<dyn Transport>,
    gate: Arc<AuthGate>,
}

impl ApiClient {
    pub fn new(config: Config, transport: Arc<dyn Transport>, gate: Arc<AuthGate>) -> Self {
        Self {
            config,
            transport,
            gate,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gate(&self) -> &Arc<AuthGate> {
        &self.gate
    }

    /// Plain request with any body encoding
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        body: RequestBody,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(path, Outgoing::Request { method, body }).await
    }

    /// `application/x-www-form-urlencoded` request
    pub async fn submit_form(
        &self,
        path: &str,
        method: Method,
        pairs: Vec<(String, String)>,
    ) -> Result<ApiResponse, ApiError> {
        self.request(path, method, RequestBody::Form(pairs)).await
    }

    /// Multipart upload of `files` with `form` as accompanying fields
    pub async fn upload(
        &self,
        path: &str,
        files: Vec<FilePart>,
        form: Vec<(String, String)>,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(path, Outgoing::Upload { files, form }).await
    }

    /// Log in and persist the issued tokens
    pub async fn login(&self, account_number: &str, password: &str) -> Result<AuthTokens, ApiError> {
        let pairs = vec![
            ("accountNumber".to_string(), account_number.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        let path = self.config.login_path().to_string();
        let response = self.submit_form(&path, Method::Post, pairs).await?;
        if !response.is_success() {
            return Err(AuthError::UnexpectedResponse(format!(
                "status {}: {}",
                response.status,
                response.body_text()
            ))
            .into());
        }

        let mut tokens: AuthTokens = serde_json::from_value(response.body)
            .map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?;
        tokens.account_number = Some(account_number.to_string());
        self.gate.tokens().save(tokens.clone()).await?;

        tracing::info!("[AUTH] logged in as {}", account_number);
        self.gate.notify(SessionEvent::LoggedIn {
            account_number: tokens.account_number.clone(),
        });
        Ok(tokens)
    }

    pub async fn logout(&self) {
        self.gate.logout().await;
    }

    async fn execute(&self, path: &str, outgoing: Outgoing) -> Result<ApiResponse, ApiError> {
        let url = self.config.api_url(path);

        if self.config.is_auth_exempt(path) {
            let response = self.send(&url, &outgoing, None).await?;
            if response.status == 401 && self.config.is_login_path(path) {
                let error = AuthError::from_login_rejection(&response.body_text());
                tracing::warn!("[AUTH] login rejected: {}", error);
                return Err(error.into());
            }
            return Ok(self.inspect(&url, response));
        }

        let token = self.gate.tokens().access_token();
        let response = self.send(&url, &outgoing, token.clone()).await?;
        if response.status != 401 {
            return Ok(self.inspect(&url, response));
        }

        tracing::debug!("[AUTH] 401 from {}", url);
        let fresh = self.gate.token_after_unauthorized(token.as_deref()).await?;
        let replay = self.send(&url, &outgoing, Some(fresh)).await?;
        if replay.status == 401 {
            tracing::warn!("[AUTH] replay of {} rejected again", url);
            return Err(AuthError::SessionExpired.into());
        }
        Ok(self.inspect(&url, replay))
    }

    async fn send(
        &self,
        url: &str,
        outgoing: &Outgoing,
        bearer: Option<String>,
    ) -> Result<ApiResponse, TransportError> {
        match outgoing.clone() {
            Outgoing::Request { method, body } => {
                self.transport
                    .request(ApiRequest {
                        url: url.to_string(),
                        method,
                        body,
                        bearer,
                    })
                    .await
            }
            Outgoing::Upload { files, form } => {
                self.transport
                    .upload(UploadRequest {
                        url: url.to_string(),
                        files,
                        form,
                        bearer,
                    })
                    .await
            }
        }
    }

    fn inspect(&self, url: &str, response: ApiResponse) -> ApiResponse {
        if response.status == 500 {
            tracing::warn!("[SYNC] server error from {}: {}", url, response.body_text());
        }
        response
    }
}
