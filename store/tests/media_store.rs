use api_client::{ExistingMedia, MediaKind, RemoteId, UploadFile};
use store::{LocalId, MediaRecord, MediaStatus, MediaStore, SourceRef, StoreEvent};

fn existing(id: u64) -> ExistingMedia {
    ExistingMedia {
        id: RemoteId::new(id.to_string()),
        media_type: MediaKind::Image,
        file_url: format!("/media/{}.jpg", id),
        file_name: format!("{}.jpg", id),
    }
}

fn pending(store: &MediaStore, name: &str) -> MediaRecord {
    let file = UploadFile::new(name, "image/jpeg", b"bytes".to_vec());
    MediaRecord::pending(store.allocate_id(), &file)
}

fn assert_dense(store: &MediaStore) {
    let positions: Vec<usize> = store.snapshot().iter().map(|r| r.position).collect();
    let expected: Vec<usize> = (0..store.len()).collect();
    assert_eq!(positions, expected);
}

#[test]
fn hydration_populates_in_snapshot_order() {
    let store = MediaStore::new();
    let ids = store.hydrate(&[existing(10), existing(11), existing(12)]);
    assert_eq!(ids.len(), 3);

    let records = store.snapshot();
    assert_eq!(records[0].remote_id, Some(RemoteId::new("10")));
    assert_eq!(records[2].display_name, "12.jpg");
    assert!(records.iter().all(|r| r.status == MediaStatus::Hydrated));
    assert_eq!(records[1].source, SourceRef::Remote("/media/11.jpg".into()));
    assert_dense(&store);
}

#[test]
fn rehydration_replaces_and_never_reuses_ids() {
    let store = MediaStore::new();
    let first = store.hydrate(&[existing(1), existing(2)]);
    let second = store.hydrate(&[existing(1)]);
    assert_eq!(store.len(), 1);
    assert!(!first.contains(&second[0]));
}

#[test]
fn insert_clamps_to_tail_and_rejects_duplicates() {
    let store = MediaStore::new();
    store.hydrate(&[existing(1), existing(2)]);
    let record = pending(&store, "new.jpg");
    let id = record.local_id;

    assert_eq!(store.insert(record.clone(), 99), Some(2));
    assert_eq!(store.insert(record, 0), None);
    assert_eq!(store.len(), 3);
    assert_eq!(store.position_of(id), Some(2));
}

#[test]
fn absent_ids_are_noops() {
    let store = MediaStore::new();
    store.hydrate(&[existing(1)]);
    let ghost = LocalId::new(999);

    assert!(!store.update_status(ghost, MediaStatus::Confirmed));
    assert!(!store.bind_remote_id(ghost, RemoteId::new("x")));
    assert!(store.remove(ghost).is_none());
    assert!(!store.reorder(&[ghost]));
    assert_eq!(store.len(), 1);
}

#[test]
fn remote_binding_is_one_way() {
    let store = MediaStore::new();
    let record = pending(&store, "a.jpg");
    let id = record.local_id;
    store.insert(record, 0);

    assert!(store.bind_remote_id(id, RemoteId::new("7")));
    assert!(store.bind_remote_id(id, RemoteId::new("7")));
    assert!(!store.bind_remote_id(id, RemoteId::new("8")));
    assert_eq!(store.get(id).unwrap().remote_id, Some(RemoteId::new("7")));
}

#[test]
fn status_follows_upload_path_only() {
    let store = MediaStore::new();
    let record = pending(&store, "a.jpg");
    let id = record.local_id;
    store.insert(record, 0);

    assert!(!store.update_status(id, MediaStatus::Confirmed));
    assert!(store.update_status(id, MediaStatus::Transferring));
    assert!(store.update_status(id, MediaStatus::Confirmed));
    assert!(!store.update_status(id, MediaStatus::Transferring));
    assert_eq!(store.get(id).unwrap().status, MediaStatus::Confirmed);
}

#[test]
fn cancelled_status_removes_record() {
    let store = MediaStore::new();
    let record = pending(&store, "a.jpg");
    let id = record.local_id;
    store.insert(record, 0);
    store.update_status(id, MediaStatus::Transferring);

    assert!(store.update_status(id, MediaStatus::Cancelled));
    assert!(!store.contains(id));
    // A late confirmation is harmless.
    assert!(!store.update_status(id, MediaStatus::Confirmed));
}

#[test]
fn reorder_keeps_unnamed_records_after_named_ones() {
    let store = MediaStore::new();
    let ids = store.hydrate(&[existing(1), existing(2), existing(3), existing(4)]);

    assert!(store.reorder(&[ids[3], ids[1], ids[3]]));
    assert_eq!(store.order(), vec![ids[3], ids[1], ids[0], ids[2]]);
    assert_dense(&store);

    assert!(!store.reorder(&store.order()));
}

#[test]
fn confirmed_order_skips_in_flight_records() {
    let store = MediaStore::new();
    store.hydrate(&[existing(1), existing(2)]);
    let record = pending(&store, "up.jpg");
    store.insert(record, 1);

    assert_eq!(
        store.confirmed_order(),
        vec![RemoteId::new("1"), RemoteId::new("2")]
    );
}

#[test]
fn positions_stay_dense_under_mixed_mutations() {
    let store = MediaStore::new();
    store.hydrate(&[existing(1), existing(2), existing(3)]);

    // Deterministic pseudo-random walk over insert/reorder/remove.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for step in 0..500 {
        match next() % 3 {
            0 => {
                let record = pending(&store, &format!("{}.jpg", step));
                let at = (next() as usize) % (store.len() + 2);
                store.insert(record, at);
            }
            1 => {
                let mut order = store.order();
                if !order.is_empty() {
                    let from = (next() as usize) % order.len();
                    let to = (next() as usize) % order.len();
                    let moved = order.remove(from);
                    order.insert(to, moved);
                    store.reorder(&order);
                }
            }
            _ => {
                let order = store.order();
                if !order.is_empty() {
                    let victim = order[(next() as usize) % order.len()];
                    store.remove(victim);
                }
            }
        }

        assert_dense(&store);
        let mut ids = store.order();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), store.len(), "duplicate local id after step {}", step);
    }
}

#[tokio::test]
async fn subscribers_see_every_mutation() {
    let store = MediaStore::new();
    let mut events = store.subscribe();
    let record = pending(&store, "a.jpg");
    let id = record.local_id;

    store.insert(record, 0);
    store.update_status(id, MediaStatus::Transferring);
    store.bind_remote_id(id, RemoteId::new("5"));
    store.remove(id);

    assert_eq!(
        events.recv().await,
        Some(StoreEvent::Inserted { local_id: id, position: 0 })
    );
    assert_eq!(
        events.recv().await,
        Some(StoreEvent::StatusChanged {
            local_id: id,
            status: MediaStatus::Transferring
        })
    );
    assert_eq!(
        events.recv().await,
        Some(StoreEvent::RemoteBound {
            local_id: id,
            remote_id: RemoteId::new("5")
        })
    );
    assert_eq!(events.recv().await, Some(StoreEvent::Removed { local_id: id }));
}

#[test]
fn dropped_subscribers_are_pruned() {
    let store = MediaStore::new();
    let events = store.subscribe();
    drop(events);
    store.hydrate(&[existing(1)]);
    assert_eq!(store.len(), 1);
}
