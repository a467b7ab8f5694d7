//! # Automatic Sync
//!
//! Periodic background upload runs.
//!
//! A tick with nothing pending does nothing. A tick that finds a run already
//! in progress (a user-triggered sync, say) skips. A run that aborts on an
//! expired session stops the task; it is restarted after the next login.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldsync::client::offline::{SyncCoordinator, UploadDispatcher};
//! use fieldsync::client::sync::AutoSync;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(coordinator: Arc<SyncCoordinator>, dispatcher: Arc<UploadDispatcher>) {
//! let auto_sync = AutoSync::spawn(coordinator, dispatcher, Duration::from_secs(300));
//! // ...
//! auto_sync.shutdown().await;
//! # }
//! ```

use crate::client::offline::{SyncCoordinator, SyncError, UploadDispatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to the background sync task
#[derive(Debug)]
pub struct AutoSync {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl AutoSync {
    pub fn spawn(
        coordinator: Arc<SyncCoordinator>,
        dispatcher: Arc<UploadDispatcher>,
        interval: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tracing::info!("[SYNC] auto sync every {:?}", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                if coordinator.stats().await.pending == 0 {
                    continue;
                }

                match dispatcher.run(&coordinator, None).await {
                    Ok(report) if report.aborted => {
                        tracing::warn!("[SYNC] session expired, auto sync stopped");
                        break;
                    }
                    Ok(_) => {}
                    Err(SyncError::AlreadyRunning) => {
                        tracing::debug!("[SYNC] run in progress, skipping tick");
                    }
                }
            }
            tracing::info!("[SYNC] auto sync stopped");
        });

        Self { handle, shutdown }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop after the current run, if any, finishes
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("[SYNC] auto sync task ended abnormally: {}", e);
        }
    }
}
