//! Shared Module
//!
//! Types that describe field records independent of how they travel: the
//! record model, media attachments, the flattened form schema, configuration
//! and the shared error type.

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Survey and germplasm records
pub mod record;

/// Media attachments (remote vs. device-local)
pub mod media;

/// Flattened form schema and payloads
pub mod form;

pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::SharedError;
pub use form::{FilePart, FormSchema, FormValue, FormWriter, Payload};
pub use media::{LocalMedia, Media, MediaKind, RemoteMedia};
pub use record::{
    Coordinate, Germplasm, GermplasmDetail, Record, RecordBody, RecordKey, RecordKind,
    RecordSyncState, Survey,
};
