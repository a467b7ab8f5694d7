//! # Sync Queue
//!
//! Ordered record mutations waiting to reach the server.
//!
//! ## Features
//!
//! - **De-duplication**: at most one unfinished item per record identity;
//!   editing a queued record replaces the item's payload in place
//! - **Status Tracking**: `pending` → `success` | `error`, `error` → `pending`
//! - **Revisions**: every in-place replacement bumps the item revision so an
//!   upload outcome for an older payload is not applied to a newer one
//! - **Cleanup**: explicit discard, clear-all, clear-errors, clear-succeeded
//!
//! The queue is plain data. Locking and persistence belong to
//! [`crate::client::offline::SyncCoordinator`].
//!
//! ## Usage
//!
//! ```rust
//! use fieldsync::client::offline::queue::SyncQueue;
//! use fieldsync::client::transport::Method;
//! use fieldsync::shared::{Record, Survey};
//!
//! let mut queue = SyncQueue::new();
//! let record = Record::survey(Survey::default()).with_temp_id("t1");
//! let id = queue.enqueue_edit(record.clone(), "/survey/add", Method::Post);
//! assert_eq!(queue.enqueue_edit(record, "/survey/add", Method::Post), id);
//! assert_eq!(queue.len(), 1);
//! ```

use crate::client::transport::Method;
use crate::shared::record::{Record, RecordKey, RecordKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Item lifecycle status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Success,
    Error { message: String },
}

impl SyncStatus {
    pub fn error(message: impl Into<String>) -> Self {
        SyncStatus::Error {
            message: message.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SyncStatus::Success)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SyncStatus::Error { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            SyncStatus::Error { message } => Some(message),
            SyncStatus::Pending | SyncStatus::Success => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Error { .. } => "error",
        }
    }
}

/// One queued record mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub id: Uuid,
    pub kind: RecordKind,
    pub url: String,
    pub method: Method,
    /// Snapshot of the record taken at enqueue time
    pub data: Record,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: u64,
}

impl SyncItem {
    fn new(record: Record, url: String, method: Method) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: record.kind(),
            url,
            method,
            data: record,
            status: SyncStatus::Pending,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Whether this item carries a mutation of the same record as `record`
    pub fn is_for(&self, record: &Record) -> bool {
        let by_temp = record
            .temp_id
            .as_ref()
            .filter(|t| !t.is_empty())
            .is_some_and(|t| self.data.matches(&RecordKey::Temp(t.clone())));
        let by_id = record
            .id
            .is_some_and(|id| self.data.matches(&RecordKey::Server(id)));
        by_temp || by_id
    }
}

/// Per-status counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub error: usize,
    pub success: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.error + self.success
    }

    pub fn unsynced(&self) -> usize {
        self.pending + self.error
    }
}

/// Ordered queue of sync items
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SyncQueue {
    items: Vec<SyncItem>,
}

impl From<Vec<SyncItem>> for SyncQueue {
    fn from(items: Vec<SyncItem>) -> Self {
        Self { items }
    }
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[SyncItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&SyncItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn position_open(&self, record: &Record) -> Option<usize> {
        self.items
            .iter()
            .position(|item| !item.status.is_success() && item.is_for(record))
    }

    /// Queue a newly created record
    ///
    /// A create for a record that already has an unfinished item replaces
    /// that item instead of adding a second one.
    pub fn enqueue_create(&mut self, record: Record, url: &str, method: Method) -> Uuid {
        if self.position_open(&record).is_some() {
            tracing::debug!("[SYNC] create for an already queued record, replacing");
        }
        self.enqueue_edit(record, url, method)
    }

    /// Queue an edit, replacing the unfinished item for the same record if
    /// there is one
    pub fn enqueue_edit(&mut self, record: Record, url: &str, method: Method) -> Uuid {
        match self.position_open(&record) {
            Some(index) => {
                let item = &mut self.items[index];
                item.kind = record.kind();
                item.data = record;
                item.url = url.to_string();
                item.method = method;
                item.status = SyncStatus::Pending;
                item.updated_at = Utc::now();
                item.revision += 1;
                item.id
            }
            None => {
                let item = SyncItem::new(record, url.to_string(), method);
                let id = item.id;
                self.items.push(item);
                id
            }
        }
    }

    pub fn remove(&mut self, id: Uuid) -> Option<SyncItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// Put an `error` item back to `pending`
    ///
    /// Returns false for unknown ids and for items that are not in `error`.
    /// A `success` item is closed; resetting it would give its record a
    /// second open item next to any later edit.
    pub fn reset(&mut self, id: Uuid) -> bool {
        match self
            .items
            .iter_mut()
            .find(|item| item.id == id && item.status.is_error())
        {
            Some(item) => {
                item.status = SyncStatus::Pending;
                item.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Apply an upload outcome if the item still holds the dispatched revision
    pub fn apply(&mut self, id: Uuid, revision: u64, status: SyncStatus) -> Option<&mut SyncItem> {
        let item = self.items.iter_mut().find(|item| item.id == id)?;
        if item.revision != revision {
            return None;
        }
        item.status = status;
        item.updated_at = Utc::now();
        Some(item)
    }

    pub fn pending(&self) -> Vec<&SyncItem> {
        self.filter(SyncStatus::is_pending)
    }

    pub fn errors(&self) -> Vec<&SyncItem> {
        self.filter(SyncStatus::is_error)
    }

    pub fn successes(&self) -> Vec<&SyncItem> {
        self.filter(SyncStatus::is_success)
    }

    /// Pending and error items together
    pub fn unsynced(&self) -> Vec<&SyncItem> {
        self.filter(|status| !status.is_success())
    }

    fn filter(&self, keep: impl Fn(&SyncStatus) -> bool) -> Vec<&SyncItem> {
        self.items.iter().filter(|item| keep(&item.status)).collect()
    }

    /// Remove every item, returning them
    pub fn clear_all(&mut self) -> Vec<SyncItem> {
        std::mem::take(&mut self.items)
    }

    /// Remove `error` items, returning them
    pub fn clear_errors(&mut self) -> Vec<SyncItem> {
        self.drain_where(SyncStatus::is_error)
    }

    /// Remove `success` items, returning them
    pub fn clear_succeeded(&mut self) -> Vec<SyncItem> {
        self.drain_where(SyncStatus::is_success)
    }

    fn drain_where(&mut self, remove: impl Fn(&SyncStatus) -> bool) -> Vec<SyncItem> {
        let (removed, kept) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| remove(&item.status));
        self.items = kept;
        removed
    }

    pub fn stats(&self) -> QueueStats {
        self.items
            .iter()
            .fold(QueueStats::default(), |mut stats, item| {
                match item.status {
                    SyncStatus::Pending => stats.pending += 1,
                    SyncStatus::Success => stats.success += 1,
                    SyncStatus::Error { .. } => stats.error += 1,
                }
                stats
            })
    }
}
