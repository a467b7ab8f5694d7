//! Key/value store whose writes can be switched off

use async_trait::async_trait;
use fieldsync::client::{KeyValueStore, MemoryStore};
use fieldsync::shared::SharedError;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SharedError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SharedError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SharedError::storage("disk full"));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), SharedError> {
        self.inner.remove(key).await
    }
}
