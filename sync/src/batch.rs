use crate::SyncError;
use api_client::{RemoteId, UploadFile};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use store::LocalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(u64);

impl BatchId {
    pub(crate) fn new(raw: u64) -> Self {
        BatchId(raw)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub local_id: LocalId,
    pub file: UploadFile,
}

/// A local record paired with the identity the server assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundEntry {
    pub local_id: LocalId,
    pub remote_id: RemoteId,
}

/// Files submitted together in one request, in attachment order.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    id: BatchId,
    entries: Vec<BatchEntry>,
}

impl UploadBatch {
    pub(crate) fn new(id: BatchId, entries: Vec<BatchEntry>) -> Self {
        UploadBatch { id, entries }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn local_ids(&self) -> Vec<LocalId> {
        self.entries.iter().map(|e| e.local_id).collect()
    }

    pub fn files(&self) -> Vec<UploadFile> {
        self.entries.iter().map(|e| e.file.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Zip the server's flat identity list back onto the batch by index.
    /// Anything but an exact count is rejected as a whole.
    pub fn pair(&self, ids: Vec<RemoteId>) -> Result<Vec<BoundEntry>, SyncError> {
        if ids.len() != self.entries.len() {
            return Err(SyncError::Correlation {
                expected: self.entries.len(),
                received: ids.len(),
            });
        }
        Ok(self
            .entries
            .iter()
            .zip(ids)
            .map(|(entry, remote_id)| BoundEntry {
                local_id: entry.local_id,
                remote_id,
            })
            .collect())
    }
}

/// Records whose upload was cancelled while their batch was in flight.
#[derive(Clone, Default)]
pub struct CancellationLedger {
    inner: Arc<Mutex<HashSet<LocalId>>>,
}

impl CancellationLedger {
    pub fn mark(&self, local_id: LocalId) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(local_id);
    }

    /// Clear the mark, reporting whether it was set.
    pub fn take(&self, local_id: LocalId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&local_id)
    }

    pub fn is_marked(&self, local_id: LocalId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&local_id)
    }
}
