//! Synchronization of the media widget with the remote store.
//!
//! Every component mutates the shared [`MediaStore`] optimistically and then
//! talks to the [`RemoteMediaStore`]. Components address records by
//! [`LocalId`] only, which is what makes the concurrently suspended
//! operations (several uploads, a reorder, a delete) safe without locks held
//! across awaits.

mod batch;
mod removal;
mod reorder;
mod upload;

pub use batch::{BatchEntry, BatchId, BoundEntry, CancellationLedger, UploadBatch};
pub use removal::{DeleteRequest, DeletionController, Removal};
pub use reorder::{move_relative, OrderReconciler, ReorderOutcome};
pub use upload::{BatchReport, UploadOrchestrator};

use api_client::{ApiClientError, RemoteMediaStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use store::{LocalId, MediaStore};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Duration;

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("API Client Error: {0}")]
    ApiClientError(#[from] ApiClientError),
    #[error("Correlation Error: expected {expected} identities, received {received}")]
    Correlation { expected: usize, received: usize },
    #[error("Upload timed out after {0:?}")]
    Timeout(Duration),
    #[error("No files selected")]
    EmptySelection,
    #[error("Record {0} cannot be reordered yet")]
    NotDraggable(LocalId),
    #[error("Record {0} not found")]
    NotFound(LocalId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    UploadFailed { files: Vec<String>, reason: String },
    ReorderFailed { reason: String },
    DeleteFailed { display_name: String, reason: String },
}

/// A user-facing failure report. One is raised per failed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub raised_at: DateTime<Utc>,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn message(&self) -> String {
        match &self.kind {
            NoticeKind::UploadFailed { files, reason } => format!(
                "Error uploading {} file(s): {}\n\n\
                 Tip: a 403 usually means the CSRF token or trusted origins are wrong. \
                 A 404 means the catalog entry does not exist or the URL is wrong.",
                files.len(),
                reason
            ),
            NoticeKind::ReorderFailed { reason } => format!(
                "Could not save the new order ({}). Reload the page to see the saved order.",
                reason
            ),
            NoticeKind::DeleteFailed {
                display_name,
                reason,
            } => format!("Could not delete {}: {}", display_name, reason),
        }
    }
}

/// Delivers notices to whoever presents them to the user.
#[derive(Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Notifier { tx: Some(tx) }, rx)
    }

    /// A notifier that only logs.
    pub fn silent() -> Self {
        Notifier { tx: None }
    }

    pub fn notify(&self, kind: NoticeKind) {
        let notice = Notice {
            raised_at: Utc::now(),
            kind,
        };
        tracing::error!(message = %notice.message(), "User notice raised");
        if let Some(tx) = &self.tx {
            if let Err(send_err) = tx.send(notice) {
                tracing::error!(error = ?send_err, "Failed to forward notice");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Upper bound for a single upload batch. `None` waits forever.
    pub upload_timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            upload_timeout: Some(DEFAULT_UPLOAD_TIMEOUT),
        }
    }
}

/// The three synchronizing components wired around one store.
#[derive(Clone)]
pub struct MediaSync {
    pub uploads: UploadOrchestrator,
    pub reorder: OrderReconciler,
    pub removal: DeletionController,
}

impl MediaSync {
    pub fn new(
        store: MediaStore,
        remote: Arc<dyn RemoteMediaStore>,
        notifier: Notifier,
        options: SyncOptions,
    ) -> Self {
        let ledger = CancellationLedger::default();
        MediaSync {
            uploads: UploadOrchestrator::new(
                store.clone(),
                remote.clone(),
                ledger.clone(),
                notifier.clone(),
                &options,
            ),
            reorder: OrderReconciler::new(store.clone(), remote.clone(), notifier.clone()),
            removal: DeletionController::new(store, remote, ledger, notifier),
        }
    }
}
