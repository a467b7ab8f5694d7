//! HTTP transport
//!
//! The narrow surface the sync core talks to: a plain request and a
//! multipart upload, both answering with a status code and a parsed body.
//! Token handling lives one layer up in [`crate::client::api`]; this layer
//! only attaches the bearer token it is handed.
//!
//! [`ReqwestTransport`] is the production implementation. Tests substitute
//! their own [`Transport`].

use crate::client::config::Config;
use crate::shared::form::FilePart;
use async_trait::async_trait;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// HTTP method for queued and direct requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    #[default]
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request body encodings
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub url: String,
    pub method: Method,
    pub body: RequestBody,
    pub bearer: Option<String>,
}

/// Multipart upload; always POSTed
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub url: String,
    pub files: Vec<FilePart>,
    pub form: Vec<(String, String)>,
    pub bearer: Option<String>,
}

/// Status code and parsed body
///
/// Bodies that are not JSON arrive as `Value::String`, empty bodies as
/// `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as display text
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Top-level field of an object body
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.as_object().and_then(|object| object.get(name))
    }
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response reached us
    #[error("network error: {0}")]
    Network(String),

    /// A staged media file could not be read
    #[error("failed to read {}: {message}", .path.display())]
    File { path: PathBuf, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;

    async fn upload(&self, request: UploadRequest) -> Result<ApiResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Self::new(config.request_timeout())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self.client.request(request.method.into(), &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(pairs) => builder.form(pairs),
        };

        let response = builder.send().await?;
        decode(response).await
    }

    async fn upload(&self, request: UploadRequest) -> Result<ApiResponse, TransportError> {
        let mut form = multipart::Form::new();
        for (key, value) in request.form {
            form = form.text(key, value);
        }
        for file in request.files {
            let bytes = tokio::fs::read(&file.path)
                .await
                .map_err(|e| TransportError::File {
                    path: file.path.clone(),
                    message: e.to_string(),
                })?;
            let file_name = file
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.name.clone());
            form = form.part(file.name, multipart::Part::bytes(bytes).file_name(file_name));
        }

        let mut builder = self.client.post(&request.url).multipart(form);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        decode(response).await
    }
}

async fn decode(response: reqwest::Response) -> Result<ApiResponse, TransportError> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    Ok(ApiResponse { status, body })
}
