//! Scripted transport for integration tests
//!
//! Plays the survey backend: replies are queued per path, and the fake
//! enforces bearer tokens the way the server does once a session is
//! expired, so refresh and replay can be exercised end to end.

use async_trait::async_trait;
use fieldsync::client::transport::{
    ApiRequest, ApiResponse, Method, RequestBody, Transport, TransportError, UploadRequest,
};
use fieldsync::shared::form::FilePart;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const BASE_URL: &str = "http://fake.local/api";
pub const REFRESH_PATH: &str = "/refresh_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Request,
    Upload,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub form: Vec<(String, String)>,
    pub json: Option<Value>,
    pub files: Vec<FilePart>,
}

impl RecordedCall {
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Respond(ApiResponse),
    /// No response at all
    Fail(String),
}

#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<RecordedCall>>,
    refresh_reply: Mutex<Option<Reply>>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicUsize,
    /// Refreshed tokens are not accepted by the other endpoints
    refresh_unhonoured: Mutex<bool>,
    /// Token the server currently accepts; `None` accepts anything
    valid_token: Mutex<Option<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `path`; the last queued reply repeats
    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.push(path, Reply::Respond(ApiResponse::new(status, body)));
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.push(path, Reply::Fail(message.to_string()));
    }

    fn push(&self, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.to_string(), delay);
    }

    /// Reject every token except `token`
    pub fn accept_only(&self, token: &str) {
        *self.valid_token.lock().unwrap() = Some(token.to_string());
    }

    /// Refresh succeeds after `delay` and issues `access`/`refresh`
    pub fn refresh_succeeds(&self, access: &str, refresh: &str, delay: Duration) {
        *self.refresh_reply.lock().unwrap() = Some(Reply::Respond(ApiResponse::new(
            200,
            json!({ "accessToken": access, "refreshToken": refresh }),
        )));
        *self.refresh_delay.lock().unwrap() = delay;
    }

    /// Refresh succeeds but the issued token is rejected like the old one
    pub fn refresh_succeeds_unhonoured(&self, access: &str, refresh: &str) {
        self.refresh_succeeds(access, refresh, Duration::ZERO);
        *self.refresh_unhonoured.lock().unwrap() = true;
    }

    /// Refresh is rejected after `delay`
    pub fn refresh_fails(&self, delay: Duration) {
        *self.refresh_reply.lock().unwrap() = Some(Reply::Respond(ApiResponse::new(
            401,
            json!("refresh token expired"),
        )));
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls to `path`, refresh calls excluded
    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }

    fn path_of(url: &str) -> String {
        url.strip_prefix(BASE_URL).unwrap_or(url).to_string()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_reply(&self, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::Respond(ApiResponse::new(200, json!({ "code": 200 }))),
        }
    }

    async fn refresh(&self) -> Result<ApiResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        let reply = self
            .refresh_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Reply::Respond(ApiResponse::new(500, Value::Null)));
        match reply {
            Reply::Respond(response) => {
                if response.status == 200 && !*self.refresh_unhonoured.lock().unwrap() {
                    let token = response.body["accessToken"].as_str().unwrap().to_string();
                    self.accept_only(&token);
                }
                Ok(response)
            }
            Reply::Fail(message) => Err(TransportError::Network(message)),
        }
    }

    async fn answer(&self, path: &str, bearer: Option<&str>) -> Result<ApiResponse, TransportError> {
        let delay = self.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !path.contains("login") && !path.contains("change_password_for_expired") {
            let valid = self.valid_token.lock().unwrap().clone();
            if let Some(valid) = valid {
                if bearer != Some(valid.as_str()) {
                    return Ok(ApiResponse::new(401, json!("token expired")));
                }
            }
        }

        match self.next_reply(path) {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(message) => Err(TransportError::Network(message)),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let path = Self::path_of(&request.url);
        let (form, json) = match request.body {
            RequestBody::Form(pairs) => (pairs, None),
            RequestBody::Json(value) => (Vec::new(), Some(value)),
            RequestBody::Empty => (Vec::new(), None),
        };
        self.record(RecordedCall {
            kind: CallKind::Request,
            method: request.method,
            path: path.clone(),
            bearer: request.bearer.clone(),
            form,
            json,
            files: Vec::new(),
        });

        if path == REFRESH_PATH {
            return self.refresh().await;
        }
        self.answer(&path, request.bearer.as_deref()).await
    }

    async fn upload(&self, request: UploadRequest) -> Result<ApiResponse, TransportError> {
        let path = Self::path_of(&request.url);
        self.record(RecordedCall {
            kind: CallKind::Upload,
            method: Method::Post,
            path: path.clone(),
            bearer: request.bearer.clone(),
            form: request.form,
            json: None,
            files: request.files,
        });
        self.answer(&path, request.bearer.as_deref()).await
    }
}
