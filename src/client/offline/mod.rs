//! # Offline Sync System
//!
//! Offline-first storage of field records and queued upload of the changes
//! once the device is back online.
//!
//! ## Architecture
//!
//! The offline system consists of:
//! - **Sync Queue**: ordered record mutations with `pending`/`success`/`error` status
//! - **Record Store**: the local copy of every collected record
//! - **Payload Builder**: record → flat form params + staged media files
//! - **Upload Dispatcher**: sequential upload runs through the API client
//! - **Reconciliation**: HTTP outcome → item status and record state
//!
//! ## Key Components
//!
//! - `queue.rs`: sync items and queue operations
//! - `records.rs`: record store
//! - `payload.rs`: payload builder
//! - `dispatcher.rs`: upload runs
//! - `reconciliation.rs`: outcome rules
//! - `history.rs`: per-run history entries
//!
//! [`SyncCoordinator`] owns the queue, the record store and the history
//! behind one lock. Every mutation completes and is persisted before the lock
//! is released, so no reader ever sees an item half updated.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldsync::client::local_db::MemoryStore;
//! use fieldsync::client::offline::SyncCoordinator;
//! use fieldsync::client::transport::Method;
//! use fieldsync::shared::{Record, Survey};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), fieldsync::shared::SharedError> {
//! let coordinator = SyncCoordinator::restore(Arc::new(MemoryStore::new())).await?;
//! let record = Record::survey(Survey::default());
//! let item = coordinator.enqueue_create(record, "/ancient_tree/survey", Method::Post).await?;
//! assert!(item.status.is_pending());
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod history;
pub mod payload;
pub mod queue;
pub mod reconciliation;
pub mod records;

pub use dispatcher::{DispatchOutcome, SyncReport, UploadDispatcher};
pub use history::{SyncHistory, SyncHistoryEntry};
pub use payload::PayloadBuilder;
pub use queue::{QueueStats, SyncItem, SyncQueue, SyncStatus};
pub use reconciliation::{ConflictCode, Resolution, ResultReconciler};
pub use records::RecordStore;

use crate::client::local_db::{load_json, load_json_list, save_json, KeyValueStore};
use crate::client::transport::Method;
use crate::shared::error::SharedError;
use crate::shared::record::{Record, RecordKey, RecordSyncState};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex, MutexGuard};
use uuid::Uuid;

/// Storage key for the queue
pub const QUEUE_KEY: &str = "sync_queue";
/// Storage key for the record store
pub const RECORDS_KEY: &str = "record_store";
/// Storage key for sync history
pub const HISTORY_KEY: &str = "sync_history";

/// Sync run errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct SyncState {
    queue: SyncQueue,
    records: RecordStore,
    history: SyncHistory,
}

/// Owner of queue, record and history state
pub struct SyncCoordinator {
    state: Mutex<SyncState>,
    store: Arc<dyn KeyValueStore>,
    run_lock: Mutex<()>,
    stats: watch::Sender<QueueStats>,
}

impl SyncCoordinator {
    /// Restore state from `store`
    ///
    /// Missing entries start empty and queue or record entries that no longer
    /// decode are dropped one by one. A store that cannot be read fails the
    /// restore, so nothing is written over the data it still holds.
    pub async fn restore(store: Arc<dyn KeyValueStore>) -> Result<Self, SharedError> {
        let queue: Vec<SyncItem> = load_json_list(store.as_ref(), QUEUE_KEY)
            .await?
            .unwrap_or_default();
        let records: Vec<Record> = load_json_list(store.as_ref(), RECORDS_KEY)
            .await?
            .unwrap_or_default();
        let state = SyncState {
            queue: SyncQueue::from(queue),
            records: RecordStore::from(records),
            history: load_json(store.as_ref(), HISTORY_KEY)
                .await?
                .unwrap_or_default(),
        };
        tracing::info!(
            "[SYNC] restored {} queued item(s), {} record(s)",
            state.queue.len(),
            state.records.len()
        );

        let (stats, _) = watch::channel(state.queue.stats());
        Ok(Self {
            state: Mutex::new(state),
            store,
            run_lock: Mutex::new(()),
            stats,
        })
    }

    /// Queue counts, updated after every change
    pub fn subscribe(&self) -> watch::Receiver<QueueStats> {
        self.stats.subscribe()
    }

    /// Queue a newly created record and add it to the record store
    ///
    /// A `tempId` is generated if the record has none.
    pub async fn enqueue_create(
        &self,
        mut record: Record,
        url: &str,
        method: Method,
    ) -> Result<SyncItem, SharedError> {
        validate_url(url)?;
        if record.temp_id.as_deref().map_or(true, str::is_empty) {
            record.temp_id = Some(Uuid::new_v4().to_string());
        }
        record.sync_state = Some(RecordSyncState::Pending);

        let mut state = self.state.lock().await;
        state.records.insert(record.clone());
        let id = state.queue.enqueue_create(record, url, method);
        self.commit(&state, false).await?;
        tracing::info!("[SYNC] queued create {}", id);
        item_snapshot(&state, id)
    }

    /// Queue an edit and update the record store copy
    pub async fn enqueue_edit(
        &self,
        mut record: Record,
        url: &str,
        method: Method,
    ) -> Result<SyncItem, SharedError> {
        validate_url(url)?;
        if record.key().is_none() {
            record.temp_id = Some(Uuid::new_v4().to_string());
        }
        record.sync_state = Some(RecordSyncState::Pending);

        let mut state = self.state.lock().await;
        if !state.records.update(record.clone()) {
            tracing::debug!("[SYNC] edited record was not in the store, adding it");
            state.records.insert(record.clone());
        }
        let id = state.queue.enqueue_edit(record, url, method);
        self.commit(&state, false).await?;
        tracing::info!("[SYNC] queued edit {}", id);
        item_snapshot(&state, id)
    }

    /// Discard an item and its record
    pub async fn remove(&self, id: Uuid) -> Result<Option<SyncItem>, SharedError> {
        let mut state = self.state.lock().await;
        let Some(item) = state.queue.remove(id) else {
            return Ok(None);
        };
        remove_record(&mut state.records, &item);
        self.commit(&state, false).await?;
        tracing::info!("[SYNC] discarded item {}", id);
        Ok(Some(item))
    }

    /// Put an `error` item back to `pending`
    ///
    /// False if there is no such item or it is not in `error`.
    pub async fn reset(&self, id: Uuid) -> Result<bool, SharedError> {
        let mut state = self.state.lock().await;
        if !state.queue.reset(id) {
            return Ok(false);
        }
        if let Some(key) = state.queue.get(id).and_then(|item| item.data.key()) {
            state.records.set_sync_state(&key, RecordSyncState::Pending);
        }
        self.commit(&state, false).await?;
        Ok(true)
    }

    /// Remove every item and its record
    pub async fn clear_all(&self) -> Result<usize, SharedError> {
        let mut state = self.state.lock().await;
        let removed = state.queue.clear_all();
        self.drop_records(&mut state, &removed).await
    }

    /// Remove every `error` item and its record
    pub async fn clear_errors(&self) -> Result<usize, SharedError> {
        let mut state = self.state.lock().await;
        let removed = state.queue.clear_errors();
        self.drop_records(&mut state, &removed).await
    }

    /// Remove `success` items; their records stay
    pub async fn clear_succeeded(&self) -> Result<usize, SharedError> {
        let mut state = self.state.lock().await;
        let removed = state.queue.clear_succeeded();
        self.commit(&state, false).await?;
        Ok(removed.len())
    }

    async fn drop_records(
        &self,
        state: &mut SyncState,
        removed: &[SyncItem],
    ) -> Result<usize, SharedError> {
        for item in removed {
            remove_record(&mut state.records, item);
        }
        self.commit(state, false).await?;
        tracing::info!("[SYNC] cleared {} item(s)", removed.len());
        Ok(removed.len())
    }

    pub async fn item(&self, id: Uuid) -> Option<SyncItem> {
        self.state.lock().await.queue.get(id).cloned()
    }

    pub async fn items(&self) -> Vec<SyncItem> {
        self.state.lock().await.queue.items().to_vec()
    }

    pub async fn pending(&self) -> Vec<SyncItem> {
        cloned(self.state.lock().await.queue.pending())
    }

    pub async fn errors(&self) -> Vec<SyncItem> {
        cloned(self.state.lock().await.queue.errors())
    }

    pub async fn successes(&self) -> Vec<SyncItem> {
        cloned(self.state.lock().await.queue.successes())
    }

    /// Pending and error items
    pub async fn unsynced(&self) -> Vec<SyncItem> {
        cloned(self.state.lock().await.queue.unsynced())
    }

    pub async fn stats(&self) -> QueueStats {
        self.state.lock().await.queue.stats()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.state.lock().await.records.records().to_vec()
    }

    pub async fn record(&self, key: &RecordKey) -> Option<Record> {
        self.state.lock().await.records.get(key).cloned()
    }

    pub async fn history(&self) -> SyncHistory {
        self.state.lock().await.history.clone()
    }

    pub async fn last_upload_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.history.last_upload_at
    }

    /// Claim the run lock
    pub(crate) fn begin_run(&self) -> Result<MutexGuard<'_, ()>, SyncError> {
        self.run_lock.try_lock().map_err(|_| SyncError::AlreadyRunning)
    }

    /// Ids of pending items in queue order, restricted to `selection`
    pub(crate) async fn pending_ids(&self, selection: Option<&[Uuid]>) -> Vec<Uuid> {
        let state = self.state.lock().await;
        state
            .queue
            .pending()
            .into_iter()
            .map(|item| item.id)
            .filter(|id| selection.map_or(true, |ids| ids.contains(id)))
            .collect()
    }

    /// Current copy of an item if it is still pending
    pub(crate) async fn pending_item(&self, id: Uuid) -> Option<SyncItem> {
        let state = self.state.lock().await;
        state
            .queue
            .get(id)
            .filter(|item| item.status.is_pending())
            .cloned()
    }

    /// Apply an upload outcome
    ///
    /// Returns false, changing nothing, if the item was removed or edited
    /// after it was dispatched.
    pub(crate) async fn apply(
        &self,
        id: Uuid,
        revision: u64,
        resolution: Resolution,
    ) -> Result<bool, SharedError> {
        let mut state = self.state.lock().await;
        let record_state = match &resolution.status {
            SyncStatus::Success => RecordSyncState::Synced,
            SyncStatus::Error { message } => RecordSyncState::Error {
                message: message.clone(),
            },
            SyncStatus::Pending => RecordSyncState::Pending,
        };

        let Some(item) = state.queue.apply(id, revision, resolution.status) else {
            tracing::debug!("[SYNC] dropping outcome for item {} (changed during upload)", id);
            return Ok(false);
        };
        if let Some(cover_id) = &resolution.cover_id {
            item.data.cover_id = Some(cover_id.clone());
        }
        let key = item.data.key();

        if let Some(key) = key {
            state.records.set_sync_state(&key, record_state);
            if let Some(cover_id) = &resolution.cover_id {
                state.records.set_cover_id(&key, cover_id);
            }
        }
        self.commit(&state, false).await?;
        Ok(true)
    }

    /// Stamp the upload time and append a history entry
    pub(crate) async fn record_run(&self, report: &SyncReport) -> Result<SyncHistoryEntry, SharedError> {
        let mut state = self.state.lock().await;
        let entry = state.history.record_upload(report).clone();
        self.commit(&state, true).await?;
        Ok(entry)
    }

    /// Persist while the caller still holds the state lock
    async fn commit(&self, state: &SyncState, history: bool) -> Result<(), SharedError> {
        save_json(self.store.as_ref(), QUEUE_KEY, &state.queue).await?;
        save_json(self.store.as_ref(), RECORDS_KEY, &state.records).await?;
        if history {
            save_json(self.store.as_ref(), HISTORY_KEY, &state.history).await?;
        }
        self.stats.send_replace(state.queue.stats());
        Ok(())
    }
}

fn validate_url(url: &str) -> Result<(), SharedError> {
    if url.trim().is_empty() {
        return Err(SharedError::validation("url", "upload URL must not be empty"));
    }
    Ok(())
}

fn item_snapshot(state: &SyncState, id: Uuid) -> Result<SyncItem, SharedError> {
    state
        .queue
        .get(id)
        .cloned()
        .ok_or_else(|| SharedError::storage(format!("queued item {} vanished", id)))
}

fn remove_record(records: &mut RecordStore, item: &SyncItem) {
    if let Some(key) = item.data.key() {
        records.remove(&key);
    }
}

fn cloned(items: Vec<&SyncItem>) -> Vec<SyncItem> {
    items.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::local_db::MemoryStore;
    use crate::shared::record::Survey;

    const URL: &str = "/ancient_tree/survey";

    /// Fails the first read, then delegates
    struct FailingReads {
        inner: Arc<MemoryStore>,
        failed: std::sync::atomic::AtomicBool,
    }

    impl FailingReads {
        fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                failed: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl KeyValueStore for FailingReads {
        async fn get(&self, key: &str) -> Result<Option<String>, SharedError> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(SharedError::storage("database is locked"));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), SharedError> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), SharedError> {
            self.inner.remove(key).await
        }
    }

    fn oak(temp_id: &str) -> Record {
        Record::survey(Survey {
            common_name: Some("Oak".to_string()),
            ..Default::default()
        })
        .with_temp_id(temp_id)
    }

    async fn coordinator() -> (SyncCoordinator, Arc<dyn KeyValueStore>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        (SyncCoordinator::restore(store.clone()).await.unwrap(), store)
    }

    #[tokio::test]
    async fn test_create_assigns_temp_id_and_stores_record() {
        let (coordinator, _) = coordinator().await;
        let item = coordinator
            .enqueue_create(Record::survey(Survey::default()), URL, Method::Post)
            .await
            .unwrap();

        let temp_id = item.data.temp_id.clone().unwrap();
        let record = coordinator.record(&RecordKey::Temp(temp_id)).await.unwrap();
        assert_eq!(record.sync_state, Some(RecordSyncState::Pending));
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let (coordinator, _) = coordinator().await;
        let result = coordinator.enqueue_create(oak("t1"), " ", Method::Post).await;
        assert!(matches!(result, Err(SharedError::ValidationError { .. })));
        assert!(coordinator.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_discards_record() {
        let (coordinator, _) = coordinator().await;
        let item = coordinator.enqueue_create(oak("t1"), URL, Method::Post).await.unwrap();

        assert!(coordinator.remove(item.id).await.unwrap().is_some());
        assert!(coordinator.records().await.is_empty());
        assert!(coordinator.remove(item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_updates_record_state() {
        let (coordinator, _) = coordinator().await;
        let item = coordinator.enqueue_create(oak("t1"), URL, Method::Post).await.unwrap();

        let resolution = Resolution {
            status: SyncStatus::error("duplicate code"),
            cover_id: Some("501".to_string()),
        };
        assert!(coordinator.apply(item.id, item.revision, resolution).await.unwrap());

        let stored = coordinator.item(item.id).await.unwrap();
        assert_eq!(stored.status.message(), Some("duplicate code"));
        assert_eq!(stored.data.cover_id.as_deref(), Some("501"));

        let record = coordinator.record(&RecordKey::Temp("t1".to_string())).await.unwrap();
        assert_eq!(record.cover_id.as_deref(), Some("501"));
        assert_eq!(
            record.sync_state,
            Some(RecordSyncState::Error {
                message: "duplicate code".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_state_survives_restore() {
        let (coordinator, store) = coordinator().await;
        let a = coordinator.enqueue_create(oak("a"), URL, Method::Post).await.unwrap();
        coordinator.enqueue_create(oak("b"), URL, Method::Post).await.unwrap();
        coordinator
            .apply(a.id, a.revision, Resolution {
                status: SyncStatus::error("boom"),
                cover_id: None,
            })
            .await
            .unwrap();
        let before = coordinator.items().await;
        drop(coordinator);

        let restored = SyncCoordinator::restore(store).await.unwrap();
        assert_eq!(restored.items().await, before);
        assert_eq!(restored.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_queue_starts_empty() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(QUEUE_KEY, "[{\"id\":").await.unwrap();

        let coordinator = SyncCoordinator::restore(store).await.unwrap();
        assert!(coordinator.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_queue_entry_drops_only_that_entry() {
        let (coordinator, store) = coordinator().await;
        coordinator.enqueue_create(oak("a"), URL, Method::Post).await.unwrap();
        coordinator.enqueue_create(oak("b"), URL, Method::Post).await.unwrap();
        let before = coordinator.items().await;
        drop(coordinator);

        let raw = store.get(QUEUE_KEY).await.unwrap().unwrap();
        let mut entries: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        let mut bad = entries[0].clone();
        bad["kind"] = serde_json::json!("plantingtask");
        entries.insert(1, bad);
        store
            .set(QUEUE_KEY, &serde_json::to_string(&entries).unwrap())
            .await
            .unwrap();

        let raw = store.get(RECORDS_KEY).await.unwrap().unwrap();
        let mut records: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        records.push(serde_json::json!({
            "tempId": "c",
            "body": { "kind": "plantingtask", "fields": {} }
        }));
        store
            .set(RECORDS_KEY, &serde_json::to_string(&records).unwrap())
            .await
            .unwrap();

        let restored = SyncCoordinator::restore(store).await.unwrap();
        assert_eq!(restored.items().await, before);
        assert_eq!(restored.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_store_fails_restore_and_keeps_data() {
        let inner = Arc::new(MemoryStore::new());
        let coordinator = SyncCoordinator::restore(inner.clone()).await.unwrap();
        for temp_id in ["a", "b", "c"] {
            coordinator.enqueue_create(oak(temp_id), URL, Method::Post).await.unwrap();
        }
        let before = coordinator.items().await;
        drop(coordinator);

        let flaky = Arc::new(FailingReads::new(inner.clone()));
        let result = SyncCoordinator::restore(flaky.clone()).await;
        assert!(matches!(result, Err(SharedError::StorageError { .. })));

        let restored = SyncCoordinator::restore(flaky).await.unwrap();
        assert_eq!(restored.items().await, before);
        restored.enqueue_create(oak("d"), URL, Method::Post).await.unwrap();
        assert_eq!(restored.items().await.len(), 4);
    }

    #[tokio::test]
    async fn test_reset_only_touches_failed_items() {
        let (coordinator, _) = coordinator().await;
        let first = coordinator.enqueue_create(oak("t1"), URL, Method::Post).await.unwrap();
        let success = Resolution {
            status: SyncStatus::Success,
            cover_id: None,
        };
        assert!(coordinator.apply(first.id, first.revision, success).await.unwrap());
        let second = coordinator.enqueue_edit(oak("t1"), URL, Method::Put).await.unwrap();
        assert_ne!(first.id, second.id);

        assert!(!coordinator.reset(first.id).await.unwrap());
        let unsynced = coordinator.unsynced().await;
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, second.id);
        assert!(coordinator.item(first.id).await.unwrap().status.is_success());
    }

    #[tokio::test]
    async fn test_stats_are_published() {
        let (coordinator, _) = coordinator().await;
        let mut receiver = coordinator.subscribe();
        coordinator.enqueue_create(oak("t1"), URL, Method::Post).await.unwrap();

        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().pending, 1);
    }

    #[tokio::test]
    async fn test_run_lock_is_exclusive() {
        let (coordinator, _) = coordinator().await;
        let guard = coordinator.begin_run().unwrap();
        assert!(matches!(coordinator.begin_run(), Err(SyncError::AlreadyRunning)));
        drop(guard);
        assert!(coordinator.begin_run().is_ok());
    }
}
