use crate::batch::{BatchEntry, BatchId, BoundEntry, CancellationLedger, UploadBatch};
use crate::{NoticeKind, Notifier, SyncError, SyncOptions};
use api_client::{RemoteId, RemoteMediaStore, UploadFile};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use store::{MediaRecord, MediaStatus, MediaStore};
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub confirmed: Vec<BoundEntry>,
    /// Identities deleted again because their record was cancelled mid-flight.
    pub cleaned_up: Vec<RemoteId>,
    pub cleanup_failed: Vec<RemoteId>,
}

/// Turns file selections into records and reconciles the batch result.
#[derive(Clone)]
pub struct UploadOrchestrator {
    store: MediaStore,
    remote: Arc<dyn RemoteMediaStore>,
    ledger: CancellationLedger,
    notifier: Notifier,
    upload_timeout: Option<Duration>,
    next_batch: Arc<AtomicU64>,
}

impl UploadOrchestrator {
    pub fn new(
        store: MediaStore,
        remote: Arc<dyn RemoteMediaStore>,
        ledger: CancellationLedger,
        notifier: Notifier,
        options: &SyncOptions,
    ) -> Self {
        UploadOrchestrator {
            store,
            remote,
            ledger,
            notifier,
            upload_timeout: options.upload_timeout,
            next_batch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create one record per file at the tail of the order and mark them
    /// transferring. Nothing touches the network yet.
    pub fn stage(&self, files: Vec<UploadFile>) -> Result<UploadBatch, SyncError> {
        if files.is_empty() {
            return Err(SyncError::EmptySelection);
        }
        let id = BatchId::new(self.next_batch.fetch_add(1, Ordering::Relaxed) + 1);
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let local_id = self.store.allocate_id();
            self.store
                .insert(MediaRecord::pending(local_id, &file), self.store.len());
            self.store.update_status(local_id, MediaStatus::Transferring);
            entries.push(BatchEntry { local_id, file });
        }
        tracing::info!(batch = %id, files = entries.len(), "Staged upload batch");
        Ok(UploadBatch::new(id, entries))
    }

    /// Send a staged batch and reconcile the answer with the store.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, batch)))]
    pub async fn transfer(&self, batch: UploadBatch) -> Result<BatchReport, SyncError> {
        let files = batch.files();
        let bound = match self.send(&files).await.and_then(|ids| batch.pair(ids)) {
            Ok(bound) => bound,
            Err(e) => {
                self.fail(&batch, &e);
                return Err(e);
            }
        };

        let mut report = BatchReport {
            batch_id: batch.id(),
            confirmed: Vec::with_capacity(bound.len()),
            cleaned_up: Vec::new(),
            cleanup_failed: Vec::new(),
        };
        let mut orphans = Vec::new();
        for entry in bound {
            let cancelled = self.ledger.take(entry.local_id);
            if cancelled || !self.store.contains(entry.local_id) {
                orphans.push(entry.remote_id);
                continue;
            }
            // A concurrent cancel or status change can land between the
            // check above and these writes.
            let confirmed = self
                .store
                .bind_remote_id(entry.local_id, entry.remote_id.clone())
                && self
                    .store
                    .update_status(entry.local_id, MediaStatus::Confirmed);
            if !confirmed {
                self.ledger.take(entry.local_id);
                tracing::warn!(
                    local_id = %entry.local_id,
                    remote_id = %entry.remote_id,
                    "Record changed before confirmation"
                );
                orphans.push(entry.remote_id);
                continue;
            }
            report.confirmed.push(entry);
        }
        tracing::info!(
            batch = %report.batch_id,
            confirmed = report.confirmed.len(),
            orphaned = orphans.len(),
            "Upload batch confirmed"
        );

        // The server persisted these but no record holds them any more.
        for remote_id in orphans {
            match self.remote.delete(&remote_id).await {
                Ok(()) => report.cleaned_up.push(remote_id),
                Err(e) => {
                    tracing::warn!(%remote_id, error = %e, "Cleanup delete after cancel failed");
                    report.cleanup_failed.push(remote_id);
                }
            }
        }
        Ok(report)
    }

    pub async fn upload(&self, files: Vec<UploadFile>) -> Result<BatchReport, SyncError> {
        let batch = self.stage(files)?;
        self.transfer(batch).await
    }

    async fn send(&self, files: &[UploadFile]) -> Result<Vec<RemoteId>, SyncError> {
        let call = self.remote.upload(files);
        match self.upload_timeout {
            Some(limit) => match timeout(limit, call).await {
                Ok(result) => result.map_err(SyncError::from),
                Err(_) => {
                    tracing::warn!(?limit, "Upload batch timed out");
                    Err(SyncError::Timeout(limit))
                }
            },
            None => call.await.map_err(SyncError::from),
        }
    }

    /// All-or-nothing failure: every surviving record of the batch is flagged.
    fn fail(&self, batch: &UploadBatch, err: &SyncError) {
        let mut failed = Vec::new();
        for entry in batch.entries() {
            if self.ledger.take(entry.local_id) {
                continue;
            }
            if self
                .store
                .update_status(entry.local_id, MediaStatus::Errored)
            {
                failed.push(entry.file.file_name.clone());
            }
        }
        tracing::error!(batch = %batch.id(), error = %err, failed = failed.len(), "Upload batch failed");
        if !failed.is_empty() {
            self.notifier.notify(NoticeKind::UploadFailed {
                files: failed,
                reason: err.to_string(),
            });
        }
    }
}
