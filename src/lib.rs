//! fieldsync - Offline-first sync for field surveys
//!
//! fieldsync keeps forestry field records (ancient-tree surveys, germplasm
//! collections) on the device while there is no connectivity and pushes them
//! to the survey backend once there is.
//!
//! # Overview
//!
//! This library provides:
//! - A durable sync queue with `pending` / `success` / `error` items
//! - A typed record model flattened into form keys by a declarative schema
//! - Sequential upload runs choosing multipart or url-encoded bodies
//! - Single-flight access token refresh with request replay
//! - Outcome reconciliation, including overridable uniqueness conflicts
//!
//! # Module Structure
//!
//! - **`shared`** - Record model, media, form schema, config, errors
//!
//! - **`client`** - Everything that runs on the device
//!   - HTTP transport and session-aware API client
//!   - Auth refresh gate and token store
//!   - SQLite / in-memory key/value persistence
//!   - Offline queue, payload builder, dispatcher, reconciler
//!   - Periodic auto sync
//!
//! # Usage
//!
//! ```rust,no_run
//! use fieldsync::client::{
//!     ApiClient, AuthGate, Config, LocalDatabase, ReqwestTransport, SyncCoordinator,
//!     TokenStore, Transport, UploadDispatcher,
//! };
//! use fieldsync::client::transport::Method;
//! use fieldsync::shared::{Record, Survey};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let store = Arc::new(LocalDatabase::open(config.db_path()).await?);
//! let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::from_config(&config)?);
//!
//! let tokens = Arc::new(TokenStore::restore(store.clone()).await);
//! let gate = Arc::new(AuthGate::new(config.clone(), transport.clone(), tokens));
//! let api = Arc::new(ApiClient::new(config, transport, gate));
//!
//! let coordinator = SyncCoordinator::restore(store).await?;
//! coordinator
//!     .enqueue_create(Record::survey(Survey::default()), "/ancient_tree/survey", Method::Post)
//!     .await?;
//!
//! let report = UploadDispatcher::new(api).run(&coordinator, None).await?;
//! println!("{} uploaded", report.succeeded);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - Queue, record and history state sit behind one `tokio::sync::Mutex`
//!   in `SyncCoordinator`; each mutation is persisted before the lock drops
//! - The auth gate serializes refreshes with its own mutex; waiting requests
//!   hold a oneshot receiver, not the lock
//!
//! # Error Handling
//!
//! - `shared::error::SharedError` for serialization, validation and storage
//! - `client::transport::TransportError`, `client::auth::AuthError`,
//!   `client::api::ApiError` for the network path
//! - Upload failures never escape a run; they become item status

/// Shared types and data structures
pub mod shared;

/// Device-side sync client
pub mod client;
