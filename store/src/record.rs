use api_client::{ExistingMedia, MediaKind, RemoteId, UploadFile};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-local identity, assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(u64);

impl LocalId {
    pub fn new(raw: u64) -> Self {
        LocalId(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Synchronization state of a single record.
///
/// `Hydrated` and `Confirmed` form the stable class: the remote store knows
/// the item and the only way out is removal. `Cancelled` and `Deleted` are
/// never held by a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Hydrated,
    Pending,
    Transferring,
    Confirmed,
    Errored,
    Cancelled,
    Deleted,
}

impl MediaStatus {
    pub fn is_stable(&self) -> bool {
        matches!(self, MediaStatus::Hydrated | MediaStatus::Confirmed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, MediaStatus::Pending | MediaStatus::Transferring)
    }

    /// Statuses that remove the record instead of being stored.
    pub fn is_removal(&self) -> bool {
        matches!(self, MediaStatus::Cancelled | MediaStatus::Deleted)
    }

    pub fn can_transition_to(&self, next: MediaStatus) -> bool {
        use MediaStatus::*;
        matches!(
            (self, next),
            (Pending, Transferring)
                | (Pending, Cancelled)
                | (Pending, Errored)
                | (Transferring, Confirmed)
                | (Transferring, Errored)
                | (Transferring, Cancelled)
                | (Errored, Deleted)
                | (Hydrated, Deleted)
                | (Confirmed, Deleted)
        )
    }
}

/// Where the bytes of a record live.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRef {
    /// Not-yet-uploaded payload held in memory.
    Local { payload: Bytes, content_type: String },
    /// Retrieval URL of a persisted item.
    Remote(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub kind: MediaKind,
    pub source: SourceRef,
    pub display_name: String,
    pub status: MediaStatus,
    pub position: usize,
}

impl MediaRecord {
    /// A freshly selected file awaiting transfer.
    pub fn pending(local_id: LocalId, file: &UploadFile) -> Self {
        MediaRecord {
            local_id,
            remote_id: None,
            kind: file.kind(),
            source: SourceRef::Local {
                payload: file.payload.clone(),
                content_type: file.content_type.clone(),
            },
            display_name: file.file_name.clone(),
            status: MediaStatus::Pending,
            position: 0,
        }
    }

    pub fn hydrated(local_id: LocalId, media: &ExistingMedia) -> Self {
        MediaRecord {
            local_id,
            remote_id: Some(media.id.clone()),
            kind: media.media_type,
            source: SourceRef::Remote(media.file_url.clone()),
            display_name: media.file_name.clone(),
            status: MediaStatus::Hydrated,
            position: 0,
        }
    }

    /// Only records the remote store already knows take part in reordering.
    pub fn is_draggable(&self) -> bool {
        self.remote_id.is_some() && self.status.is_stable()
    }
}
