//! Client Module
//!
//! The device side of field data collection: configuration, the HTTP
//! transport, session handling, local persistence and the offline sync core.

pub mod api;
pub mod auth;
pub mod config;
pub mod local_db;
pub mod offline;
pub mod sync;
pub mod transport;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthGate, AuthTokens, LogoutReason, SessionEvent, TokenStore};
pub use config::Config;
pub use local_db::{KeyValueStore, LocalDatabase, MemoryStore};
pub use offline::{SyncCoordinator, SyncError, SyncReport, UploadDispatcher};
pub use sync::AutoSync;
pub use transport::{ApiResponse, Method, ReqwestTransport, Transport, TransportError};
