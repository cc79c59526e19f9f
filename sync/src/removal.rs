use crate::batch::CancellationLedger;
use crate::{NoticeKind, Notifier, SyncError};
use api_client::{RemoteId, RemoteMediaStore};
use std::sync::Arc;
use store::{LocalId, MediaStatus, MediaStore};

/// What a delete click resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// In-flight upload dropped locally; its batch cleans up remotely.
    Cancelled(LocalId),
    /// Errored record dismissed; the server never kept it.
    Discarded(LocalId),
    /// Persisted record; nothing happens until the user confirms.
    NeedsConfirmation(DeleteRequest),
    NotFound(LocalId),
}

/// A pending deletion of a persisted record. Dropping it declines.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub local_id: LocalId,
    pub remote_id: RemoteId,
    pub display_name: String,
}

#[derive(Clone)]
pub struct DeletionController {
    store: MediaStore,
    remote: Arc<dyn RemoteMediaStore>,
    ledger: CancellationLedger,
    notifier: Notifier,
}

impl DeletionController {
    pub fn new(
        store: MediaStore,
        remote: Arc<dyn RemoteMediaStore>,
        ledger: CancellationLedger,
        notifier: Notifier,
    ) -> Self {
        DeletionController {
            store,
            remote,
            ledger,
            notifier,
        }
    }

    /// Dispatch a delete click on the record's current status.
    pub fn request(&self, local_id: LocalId) -> Removal {
        let Some(record) = self.store.get(local_id) else {
            return Removal::NotFound(local_id);
        };
        match (record.status, record.remote_id) {
            (status, _) if status.is_in_flight() => {
                self.ledger.mark(local_id);
                self.store.update_status(local_id, MediaStatus::Cancelled);
                tracing::info!(%local_id, "Upload cancelled");
                Removal::Cancelled(local_id)
            }
            (status, Some(remote_id)) if status.is_stable() => {
                Removal::NeedsConfirmation(DeleteRequest {
                    local_id,
                    remote_id,
                    display_name: record.display_name,
                })
            }
            _ => {
                self.store.remove(local_id);
                tracing::info!(%local_id, "Errored record dismissed");
                Removal::Discarded(local_id)
            }
        }
    }

    /// Delete a confirmed record remotely, then locally.
    ///
    /// On failure the record stays where it is and the user is told once.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn confirm(&self, request: DeleteRequest) -> Result<(), SyncError> {
        if !self.store.contains(request.local_id) {
            tracing::debug!(local_id = %request.local_id, "Record already gone");
            return Ok(());
        }
        match self.remote.delete(&request.remote_id).await {
            Ok(()) => {
                self.store
                    .update_status(request.local_id, MediaStatus::Deleted);
                tracing::info!(remote_id = %request.remote_id, "Media deleted");
                Ok(())
            }
            Err(e) => {
                tracing::error!(remote_id = %request.remote_id, error = %e, "Delete failed");
                self.notifier.notify(NoticeKind::DeleteFailed {
                    display_name: request.display_name,
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }
}
