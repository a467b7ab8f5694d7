//! Key/value persistence
//!
//! Queue, record and token state are stored as JSON documents under fixed
//! keys. A value that no longer parses is dropped with a warning so a bad
//! write never keeps the client from starting. A store that cannot be read
//! is an error: treating it as empty would let the next write replace data
//! that is still on disk.

use crate::shared::error::SharedError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SharedError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), SharedError>;

    async fn remove(&self, key: &str) -> Result<(), SharedError>;
}

/// In-process store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SharedError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SharedError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SharedError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Read and decode `key`
///
/// Missing and corrupt entries come back as `Ok(None)`; corrupt entries are
/// removed. Read failures are returned.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, SharedError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            discard(store, key, &e).await;
            Ok(None)
        }
    }
}

/// Read a JSON array under `key`, decoding each element on its own
///
/// Elements that do not decode are dropped with a warning and the rest are
/// kept. If the document is not an array at all it is treated like a
/// corrupt [`load_json`] entry.
pub async fn load_json_list<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<Vec<T>>, SharedError> {
    let Some(raw) = load_json::<Vec<Value>>(store, key).await? else {
        return Ok(None);
    };

    let total = raw.len();
    let items: Vec<T> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("[STORE] dropping entry {} of {}: {}", index, key, e);
                None
            }
        })
        .collect();
    if items.len() < total {
        tracing::warn!(
            "[STORE] kept {} of {} entries in {}",
            items.len(),
            total,
            key
        );
    }
    Ok(Some(items))
}

async fn discard(store: &dyn KeyValueStore, key: &str, error: &serde_json::Error) {
    tracing::warn!("[STORE] discarding corrupt entry {}: {}", key, error);
    if let Err(e) = store.remove(key).await {
        tracing::warn!("[STORE] failed to remove {}: {}", key, e);
    }
}

/// Encode and write `value` under `key`
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), SharedError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}
