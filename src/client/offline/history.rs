//! Sync history
//!
//! One entry per sync run plus the time of the last upload, shown on the
//! sync screen.

use crate::client::offline::dispatcher::SyncReport;
use crate::shared::record::RecordKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entries kept before the oldest are dropped
pub const MAX_HISTORY_ENTRIES: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDirection {
    Download,
    Upload,
}

/// Record family an upload run covered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadType {
    AncientTree,
    GermplasmResources,
}

impl From<RecordKind> for UploadType {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Survey => UploadType::AncientTree,
            RecordKind::Germplasm => UploadType::GermplasmResources,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistoryEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub direction: SyncDirection,
    pub success: bool,
    /// Absent when the run mixed record families or uploaded nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_type: Option<UploadType>,
    #[serde(default)]
    pub uploaded: usize,
    #[serde(default)]
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_upload_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: Vec<SyncHistoryEntry>,
}

impl SyncHistory {
    /// Append an upload entry for `report` and stamp the upload time
    pub fn record_upload(&mut self, report: &SyncReport) -> &SyncHistoryEntry {
        let now = Utc::now();
        self.last_upload_at = Some(now);
        self.entries.push(SyncHistoryEntry {
            id: Uuid::new_v4(),
            created_at: now,
            direction: SyncDirection::Upload,
            success: report.is_clean(),
            upload_type: report.single_kind().map(UploadType::from),
            uploaded: report.succeeded,
            failed: report.failed,
        });
        if self.entries.len() > MAX_HISTORY_ENTRIES {
            let excess = self.entries.len() - MAX_HISTORY_ENTRIES;
            self.entries.drain(..excess);
        }
        &self.entries[self.entries.len() - 1]
    }
}
