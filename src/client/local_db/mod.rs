//! # Local Database Module
//!
//! Durable storage for everything the sync core must survive a restart with:
//! the sync queue, the record store, sync history and the login tokens.
//!
//! ## Architecture
//!
//! State is kept as JSON documents in a single SQLite key/value table. The
//! documents are small (one per concern) and always written whole, so there
//! is no partial-row state to reconcile after a crash.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: SQLite connection, schema and migrations
//! - `store.rs`: the `KeyValueStore` trait, `MemoryStore`, JSON helpers
//! - `schema.rs`: schema version bookkeeping
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldsync::client::local_db::{KeyValueStore, LocalDatabase};
//!
//! # async fn example() -> Result<(), fieldsync::shared::SharedError> {
//! let db = LocalDatabase::open("/var/lib/fieldsync/local.db").await?;
//! db.set("sync_queue", "[]").await?;
//! # Ok(())
//! # }
//! ```

pub mod schema;
pub mod store;

pub use store::{load_json, load_json_list, save_json, KeyValueStore, MemoryStore};

use crate::shared::error::SharedError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, SharedError>;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Uses WAL mode so readers never block the writer.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA temp_store=MEMORY").execute(&pool).await?;

        let db = Self { pool };
        db.init_schema().await?;
        tracing::debug!("[STORE] opened {}", path.display());
        Ok(db)
    }

    /// Private in-memory database; one connection so every query sees the
    /// same data
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(schema::BASE_SCHEMA).execute(&self.pool).await?;
        self.run_migrations().await
    }

    /// Apply any migrations newer than the recorded version
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let (current_version,): (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for version in schema::pending_migrations(current_version) {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
            tracing::info!("[STORE] applied schema migration {}", version);
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stored keys, for diagnostics
    pub async fn keys(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

#[async_trait]
impl KeyValueStore for LocalDatabase {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
