//! # Upload Dispatcher
//!
//! Drains pending queue items against the API, one at a time and in queue
//! order.
//!
//! ## Features
//!
//! - **Path Selection**: multipart when the payload stages files, a
//!   url-encoded body otherwise; never both
//! - **Sequential Runs**: each item is fully resolved before the next starts,
//!   and one failed item does not stop the run
//! - **Session Abort**: an unrecoverable 401 stops the run and leaves the
//!   current and remaining items `pending`
//! - **Storage Faults**: an outcome that cannot be persisted stays applied in
//!   memory and is counted as unsaved; the run carries on
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldsync::client::offline::{SyncCoordinator, UploadDispatcher};
//! # async fn example(coordinator: SyncCoordinator, dispatcher: UploadDispatcher) {
//! let report = dispatcher.run(&coordinator, None).await.unwrap();
//! println!("{} uploaded, {} failed", report.succeeded, report.failed);
//! # }
//! ```

use crate::client::api::{ApiClient, ApiError};
use crate::client::offline::payload::PayloadBuilder;
use crate::client::offline::queue::SyncItem;
use crate::client::offline::reconciliation::{Resolution, ResultReconciler};
use crate::client::offline::{SyncCoordinator, SyncError};
use crate::shared::record::RecordKind;
use std::sync::Arc;
use uuid::Uuid;

/// Result of driving one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Resolved(Resolution),
    /// The session could not be recovered; stop the run
    SessionExpired,
}

/// Summary of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Outcomes dropped because the item was edited or removed mid-upload
    pub stale: usize,
    /// Outcomes applied in memory whose write to storage failed
    pub unsaved: usize,
    pub aborted: bool,
    /// Record families attempted, in first-seen order
    pub kinds: Vec<RecordKind>,
}

impl SyncReport {
    /// Every attempted item succeeded and the run finished
    pub fn is_clean(&self) -> bool {
        !self.aborted && self.failed == 0 && self.unsaved == 0
    }

    /// The only record family in the run, if there was exactly one
    pub fn single_kind(&self) -> Option<RecordKind> {
        match self.kinds.as_slice() {
            [kind] => Some(*kind),
            _ => None,
        }
    }

    fn note_kind(&mut self, kind: RecordKind) {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
    }
}

pub struct UploadDispatcher {
    api: Arc<ApiClient>,
}

impl UploadDispatcher {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Send one item and interpret the outcome
    pub async fn dispatch(&self, item: &SyncItem) -> DispatchOutcome {
        let payload = PayloadBuilder::build(&item.data);
        let pairs = payload.form_pairs();

        let result = if payload.has_files() {
            tracing::debug!(
                "[SYNC] item {} -> multipart {} ({} file(s))",
                item.id,
                item.url,
                payload.files.len()
            );
            self.api.upload(&item.url, payload.files, pairs).await
        } else {
            tracing::debug!("[SYNC] item {} -> form {:?} {}", item.id, item.method, item.url);
            self.api.submit_form(&item.url, item.method, pairs).await
        };

        match result {
            Ok(response) => {
                if !response.is_success() {
                    tracing::warn!(
                        "[SYNC] item {} rejected with {}: {}",
                        item.id,
                        response.status,
                        response.body_text()
                    );
                }
                DispatchOutcome::Resolved(ResultReconciler::resolve(item.id, &response))
            }
            Err(ApiError::Transport(e)) => {
                tracing::warn!("[SYNC] item {} failed: {}", item.id, e);
                DispatchOutcome::Resolved(ResultReconciler::resolve_failure(&e))
            }
            Err(ApiError::Auth(e)) => {
                tracing::warn!("[SYNC] item {} stopped by auth failure: {}", item.id, e);
                DispatchOutcome::SessionExpired
            }
        }
    }

    /// Upload pending items, optionally only those in `selection`
    ///
    /// Fails fast with [`SyncError::AlreadyRunning`] if another run holds
    /// the coordinator.
    pub async fn run(
        &self,
        coordinator: &SyncCoordinator,
        selection: Option<&[Uuid]>,
    ) -> Result<SyncReport, SyncError> {
        let _run = coordinator.begin_run()?;
        let ids = coordinator.pending_ids(selection).await;
        tracing::info!("[SYNC] starting upload run, {} pending item(s)", ids.len());

        let mut report = SyncReport::default();
        for (index, id) in ids.iter().enumerate() {
            // Removed or already handled since the run started
            let Some(item) = coordinator.pending_item(*id).await else {
                continue;
            };
            report.attempted += 1;
            report.note_kind(item.kind);
            tracing::info!("[SYNC] uploading item {}/{} ({})", index + 1, ids.len(), item.kind);

            match self.dispatch(&item).await {
                DispatchOutcome::SessionExpired => {
                    report.aborted = true;
                    tracing::warn!(
                        "[SYNC] session expired, run stopped with {} item(s) left pending",
                        ids.len() - index
                    );
                    break;
                }
                DispatchOutcome::Resolved(resolution) => {
                    let succeeded = resolution.status.is_success();
                    match coordinator.apply(item.id, item.revision, resolution).await {
                        Ok(false) => {
                            report.stale += 1;
                            continue;
                        }
                        Ok(true) => {}
                        Err(e) => {
                            // Held in memory; the next successful write persists it
                            tracing::error!(
                                "[SYNC] failed to save outcome of item {}: {}",
                                item.id,
                                e
                            );
                            report.unsaved += 1;
                        }
                    }
                    if succeeded {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        if let Err(e) = coordinator.record_run(&report).await {
            tracing::error!("[SYNC] failed to save run history: {}", e);
        }
        tracing::info!(
            "[SYNC] run finished: {} uploaded, {} failed, {} stale, {} unsaved{}",
            report.succeeded,
            report.failed,
            report.stale,
            report.unsaved,
            if report.aborted { ", aborted" } else { "" }
        );
        Ok(report)
    }
}
