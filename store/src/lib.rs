//! Local state store for the media widget.
//!
//! Holds the ordered records the renderer projects and broadcasts a
//! [`StoreEvent`] for every mutation. Local state is a proposal: it can always
//! be thrown away and rebuilt from a fresh hydration.
//!
//! Every mutation is synchronous and total. Addressing an absent [`LocalId`]
//! is a no-op, so late or duplicate completions are harmless.

mod record;

pub use record::{LocalId, MediaRecord, MediaStatus, SourceRef};

use api_client::{ExistingMedia, RemoteId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Inserted { local_id: LocalId, position: usize },
    StatusChanged { local_id: LocalId, status: MediaStatus },
    RemoteBound { local_id: LocalId, remote_id: RemoteId },
    Reordered { order: Vec<LocalId> },
    Removed { local_id: LocalId },
    Hydrated { count: usize },
}

#[derive(Default)]
struct StoreInner {
    records: Vec<MediaRecord>,
    next_id: u64,
    subscribers: Vec<mpsc::UnboundedSender<StoreEvent>>,
}

impl StoreInner {
    fn index_of(&self, local_id: LocalId) -> Option<usize> {
        self.records.iter().position(|r| r.local_id == local_id)
    }

    fn renumber(&mut self) {
        for (position, record) in self.records.iter_mut().enumerate() {
            record.position = position;
        }
    }

    fn emit(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn take(&mut self, local_id: LocalId) -> Option<MediaRecord> {
        let idx = self.index_of(local_id)?;
        let removed = self.records.remove(idx);
        self.renumber();
        self.emit(StoreEvent::Removed { local_id });
        Some(removed)
    }
}

/// Shared handle to the ordered record collection.
#[derive(Clone, Default)]
pub struct MediaStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out a fresh local identity.
    pub fn allocate_id(&self) -> LocalId {
        let mut inner = self.lock();
        inner.next_id += 1;
        LocalId::new(inner.next_id)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Replace the whole collection with a remote snapshot.
    pub fn hydrate(&self, snapshot: &[ExistingMedia]) -> Vec<LocalId> {
        let mut inner = self.lock();
        let mut records = Vec::with_capacity(snapshot.len());
        for media in snapshot {
            inner.next_id += 1;
            records.push(MediaRecord::hydrated(LocalId::new(inner.next_id), media));
        }
        let ids = records.iter().map(|r| r.local_id).collect();
        inner.records = records;
        inner.renumber();
        let count = inner.records.len();
        inner.emit(StoreEvent::Hydrated { count });
        tracing::info!(count, "Hydrated media store");
        ids
    }

    /// Insert `record` at `at` (clamped to the tail). Returns the position it
    /// landed on, or `None` when the local id is already present.
    pub fn insert(&self, record: MediaRecord, at: usize) -> Option<usize> {
        let mut inner = self.lock();
        let local_id = record.local_id;
        if inner.index_of(local_id).is_some() {
            tracing::warn!(%local_id, "Refusing duplicate insert");
            return None;
        }
        let position = at.min(inner.records.len());
        inner.records.insert(position, record);
        inner.renumber();
        inner.emit(StoreEvent::Inserted { local_id, position });
        Some(position)
    }

    /// Move a record along its status path. Removal statuses drop the record.
    pub fn update_status(&self, local_id: LocalId, status: MediaStatus) -> bool {
        let mut inner = self.lock();
        let Some(idx) = inner.index_of(local_id) else {
            tracing::debug!(%local_id, ?status, "Status update for absent record ignored");
            return false;
        };
        let current = inner.records[idx].status;
        if !current.can_transition_to(status) {
            tracing::warn!(%local_id, ?current, ?status, "Rejected status transition");
            return false;
        }
        if status.is_removal() {
            return inner.take(local_id).is_some();
        }
        inner.records[idx].status = status;
        inner.emit(StoreEvent::StatusChanged { local_id, status });
        true
    }

    /// Attach the server identity. The binding is set once and never changes.
    pub fn bind_remote_id(&self, local_id: LocalId, remote_id: RemoteId) -> bool {
        let mut inner = self.lock();
        let Some(idx) = inner.index_of(local_id) else {
            return false;
        };
        match &inner.records[idx].remote_id {
            Some(existing) if *existing == remote_id => return true,
            Some(existing) => {
                tracing::warn!(%local_id, %existing, %remote_id, "Remote id already bound");
                return false;
            }
            None => {}
        }
        inner.records[idx].remote_id = Some(remote_id.clone());
        inner.emit(StoreEvent::RemoteBound { local_id, remote_id });
        true
    }

    /// Apply a new order. Unknown or repeated ids are skipped; records not
    /// named keep their relative order after the named ones.
    pub fn reorder(&self, order: &[LocalId]) -> bool {
        let mut inner = self.lock();
        let len = inner.records.len();
        let mut taken = vec![false; len];
        let mut next = Vec::with_capacity(len);
        for local_id in order {
            if let Some(idx) = inner.index_of(*local_id) {
                if !taken[idx] {
                    taken[idx] = true;
                    next.push(idx);
                }
            }
        }
        next.extend((0..len).filter(|idx| !taken[*idx]));

        if next.iter().enumerate().all(|(i, idx)| i == *idx) {
            return false;
        }

        let mut old: Vec<Option<MediaRecord>> = inner.records.drain(..).map(Some).collect();
        inner.records = next.into_iter().filter_map(|idx| old[idx].take()).collect();
        inner.renumber();
        let order = inner.records.iter().map(|r| r.local_id).collect();
        inner.emit(StoreEvent::Reordered { order });
        true
    }

    pub fn remove(&self, local_id: LocalId) -> Option<MediaRecord> {
        self.lock().take(local_id)
    }

    pub fn get(&self, local_id: LocalId) -> Option<MediaRecord> {
        let inner = self.lock();
        inner.index_of(local_id).map(|idx| inner.records[idx].clone())
    }

    pub fn contains(&self, local_id: LocalId) -> bool {
        self.lock().index_of(local_id).is_some()
    }

    pub fn position_of(&self, local_id: LocalId) -> Option<usize> {
        self.lock().index_of(local_id)
    }

    pub fn snapshot(&self) -> Vec<MediaRecord> {
        self.lock().records.clone()
    }

    pub fn order(&self) -> Vec<LocalId> {
        self.lock().records.iter().map(|r| r.local_id).collect()
    }

    /// Remote identities of the records the server knows, in local order.
    pub fn confirmed_order(&self) -> Vec<RemoteId> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.status.is_stable())
            .filter_map(|r| r.remote_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}
