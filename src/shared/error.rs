//! Errors from queueing and persisting field records
//!
//! `SharedError` is what the sync coordinator and the key/value stores return.
//! Upload failures are not in here: those become item status.
//!
//! - `SerializationError` - queue, record or history state failed to encode
//!   to JSON before a write
//! - `ValidationError` - a queue call was given input it cannot store; today
//!   the only source is an empty upload URL
//! - `StorageError` - the SQLite store or its directory could not be read or
//!   written
//!
//! A document that fails to *decode* on restore is not an error. It is logged
//! and dropped, see `client::local_db::load_json`.
//!
//! ```rust
//! use fieldsync::shared::error::SharedError;
//!
//! let error = SharedError::validation("url", "upload URL must not be empty");
//! assert_eq!(error.to_string(), "invalid url: upload URL must not be empty");
//! ```
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SharedError {
    #[error("could not encode sync state: {message}")]
    SerializationError { message: String },

    #[error("invalid {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("local store failed: {message}")]
    StorageError { message: String },
}

impl SharedError {
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Reject an argument to a queue call; `field` names the argument
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    /// The store itself failed, as opposed to the data in it
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::StorageError { .. })
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<sqlx::Error> for SharedError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(format!("sqlite: {}", err))
    }
}

// Creating the database directory
impl From<std::io::Error> for SharedError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(format!("data directory: {}", err))
    }
}
