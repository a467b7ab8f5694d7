//! # Result Reconciliation
//!
//! Maps one upload outcome onto the queue item's status, plus the cover
//! reference for a conflict the server lets the user override.
//!
//! ## Rules
//!
//! - **2xx**: success
//! - **409**: the body carries an application `code` and `message`; see
//!   [`ConflictCode`]
//! - **403 / 404 / 413 / 500**: error with the response body verbatim
//! - **anything else, or no response**: error with a generic message
//!
//! 401 never reaches this module; the auth gate either replays the request
//! or aborts the run.
//!
//! ## Usage
//!
//! ```rust
//! use fieldsync::client::offline::reconciliation::ResultReconciler;
//! use fieldsync::client::transport::ApiResponse;
//! use serde_json::json;
//! use uuid::Uuid;
//!
//! let response = ApiResponse::new(409, json!({"code": 610, "message": "duplicate code", "data": {"id": 501}}));
//! let resolution = ResultReconciler::resolve(Uuid::new_v4(), &response);
//! assert_eq!(resolution.status.message(), Some("duplicate code"));
//! assert_eq!(resolution.cover_id.as_deref(), Some("501"));
//! ```

use crate::client::offline::queue::SyncStatus;
use crate::client::transport::{ApiResponse, TransportError};
use serde_json::Value;
use uuid::Uuid;

/// Message for a conflict body with no usable code or message
pub const UNIQUE_CONFLICT_MESSAGE: &str = "unique key conflict, contact administrator";

/// Message when no response was received
pub const NETWORK_ERROR_MESSAGE: &str = "upload failed, check the network connection";

/// Message for unexpected statuses
pub const SERVER_ERROR_MESSAGE: &str = "server error, please try again later";

/// Application codes carried in 409 bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCode {
    /// Code number already used, no override
    DuplicateCode,
    /// Code number already used; resubmit with `coverId` to overwrite
    DuplicateOverridable,
    NoPermission,
    TaskNotFound,
    TaskCompleted,
    WatermarkFailed,
}

impl ConflictCode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            609 => Some(ConflictCode::DuplicateCode),
            610 => Some(ConflictCode::DuplicateOverridable),
            611 => Some(ConflictCode::NoPermission),
            612 => Some(ConflictCode::TaskNotFound),
            613 => Some(ConflictCode::TaskCompleted),
            614 => Some(ConflictCode::WatermarkFailed),
            _ => None,
        }
    }

    pub fn is_overridable(self) -> bool {
        matches!(self, ConflictCode::DuplicateOverridable)
    }
}

/// What to do with an item after one upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: SyncStatus,
    /// Set only for an overridable conflict
    pub cover_id: Option<String>,
}

impl Resolution {
    fn status(status: SyncStatus) -> Self {
        Self {
            status,
            cover_id: None,
        }
    }
}

pub struct ResultReconciler;

impl ResultReconciler {
    /// Resolve a received response
    pub fn resolve(item_id: Uuid, response: &ApiResponse) -> Resolution {
        if response.is_success() {
            return Resolution::status(SyncStatus::Success);
        }

        match response.status {
            409 => Self::resolve_conflict(item_id, response),
            403 | 404 | 413 | 500 => {
                let text = response.body_text();
                let message = if text.trim().is_empty() {
                    format!("request failed with status {}", response.status)
                } else {
                    text
                };
                Resolution::status(SyncStatus::error(message))
            }
            _ => Resolution::status(SyncStatus::error(SERVER_ERROR_MESSAGE)),
        }
    }

    /// Resolve a request that never produced a response
    pub fn resolve_failure(error: &TransportError) -> Resolution {
        let message = match error {
            TransportError::File { .. } => error.to_string(),
            TransportError::Network(_) | TransportError::InvalidRequest(_) => {
                NETWORK_ERROR_MESSAGE.to_string()
            }
        };
        Resolution::status(SyncStatus::error(message))
    }

    fn resolve_conflict(item_id: Uuid, response: &ApiResponse) -> Resolution {
        let code = response.field("code").and_then(Value::as_i64);
        let message = response
            .field("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string);

        match (code.and_then(ConflictCode::from_code), message) {
            (Some(conflict), Some(message)) if conflict.is_overridable() => Resolution {
                status: SyncStatus::error(message),
                cover_id: Some(Self::conflicting_id(response).unwrap_or_else(|| item_id.to_string())),
            },
            (_, Some(message)) => Resolution::status(SyncStatus::error(message)),
            (_, None) => Resolution::status(SyncStatus::error(UNIQUE_CONFLICT_MESSAGE)),
        }
    }

    /// Id of the conflicting remote record, from `data.id` or `id`
    fn conflicting_id(response: &ApiResponse) -> Option<String> {
        let nested = response.field("data").and_then(|data| data.get("id"));
        nested
            .or_else(|| response.field("id"))
            .and_then(|id| match id {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
    }
}
