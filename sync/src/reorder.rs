use crate::{NoticeKind, Notifier, SyncError};
use api_client::{RemoteId, RemoteMediaStore};
use std::sync::Arc;
use store::{LocalId, MediaStore};

/// Move the element at `from` next to the element at `to`.
///
/// Dragging downward lands after the target, dragging upward lands before
/// it. After splicing the source out, both cases reinsert at index `to`.
pub fn move_relative<T: Clone>(order: &[T], from: usize, to: usize) -> Vec<T> {
    let mut next = order.to_vec();
    if from == to || from >= next.len() || to >= next.len() {
        return next;
    }
    let moved = next.remove(from);
    next.insert(to, moved);
    next
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderOutcome {
    Unchanged,
    Applied { order: Vec<RemoteId> },
}

/// Applies drag-and-drop gestures locally, then pushes the full order.
#[derive(Clone)]
pub struct OrderReconciler {
    store: MediaStore,
    remote: Arc<dyn RemoteMediaStore>,
    notifier: Notifier,
}

impl OrderReconciler {
    pub fn new(store: MediaStore, remote: Arc<dyn RemoteMediaStore>, notifier: Notifier) -> Self {
        OrderReconciler {
            store,
            remote,
            notifier,
        }
    }

    /// The local order that dropping `source` onto `target` would produce.
    pub fn plan(&self, source: LocalId, target: LocalId) -> Result<Option<Vec<LocalId>>, SyncError> {
        let records = self.store.snapshot();
        let find = |id: LocalId| {
            records
                .iter()
                .position(|r| r.local_id == id)
                .ok_or(SyncError::NotFound(id))
        };
        let from = find(source)?;
        let to = find(target)?;
        for idx in [from, to] {
            if !records[idx].is_draggable() {
                return Err(SyncError::NotDraggable(records[idx].local_id));
            }
        }
        if from == to {
            return Ok(None);
        }
        let order: Vec<LocalId> = records.iter().map(|r| r.local_id).collect();
        Ok(Some(move_relative(&order, from, to)))
    }

    /// Apply the drop to the store and return the order to push, or `None`
    /// when nothing moved.
    pub fn apply(&self, source: LocalId, target: LocalId) -> Result<Option<Vec<RemoteId>>, SyncError> {
        let Some(order) = self.plan(source, target)? else {
            return Ok(None);
        };
        self.store.reorder(&order);
        Ok(Some(self.store.confirmed_order()))
    }

    /// Send `order` as the new canonical order.
    ///
    /// A failed push is reported once and not rolled back: another operation
    /// may have changed the store meanwhile, so the user is told to reload.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn push(&self, order: Vec<RemoteId>) -> Result<ReorderOutcome, SyncError> {
        if let Err(e) = self.remote.reorder(&order).await {
            tracing::error!(error = %e, "Reorder rejected by remote store");
            self.notifier.notify(NoticeKind::ReorderFailed {
                reason: e.to_string(),
            });
            return Err(e.into());
        }
        tracing::info!(items = order.len(), "Order saved");
        Ok(ReorderOutcome::Applied { order })
    }

    /// Apply a drop optimistically, then push the resulting order.
    pub async fn drop_on(&self, source: LocalId, target: LocalId) -> Result<ReorderOutcome, SyncError> {
        match self.apply(source, target)? {
            Some(order) => self.push(order).await,
            None => Ok(ReorderOutcome::Unchanged),
        }
    }
}
