use api_client::{RemoteId, UploadFile};
use mocks::{FakeRemote, RemoteCall};
use std::sync::Arc;
use store::{MediaStatus, MediaStore};
use sync::{MediaSync, NoticeKind, Notifier, Removal, SyncError, SyncOptions};
use tokio::time::Duration;

fn files(names: &[&str]) -> Vec<UploadFile> {
    names
        .iter()
        .map(|n| UploadFile::new(*n, "image/jpeg", n.as_bytes().to_vec()))
        .collect()
}

fn setup(remote: &Arc<FakeRemote>, options: SyncOptions) -> (MediaStore, MediaSync, tokio::sync::mpsc::UnboundedReceiver<sync::Notice>) {
    let store = MediaStore::new();
    let (notifier, notices) = Notifier::channel();
    let sync = MediaSync::new(store.clone(), remote.clone(), notifier, options);
    (store, sync, notices)
}

#[tokio::test]
async fn batch_confirms_in_selection_order() {
    let remote = Arc::new(FakeRemote::new());
    let (store, sync, mut notices) = setup(&remote, SyncOptions::default());

    let report = sync
        .uploads
        .upload(files(&["a.jpg", "b.jpg", "c.jpg"]))
        .await
        .unwrap();

    assert_eq!(report.confirmed.len(), 3);
    let records = store.snapshot();
    let names: Vec<&str> = records.iter().map(|r| r.display_name.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    let ids: Vec<RemoteId> = records.iter().filter_map(|r| r.remote_id.clone()).collect();
    assert_eq!(ids, vec![RemoteId::new("101"), RemoteId::new("102"), RemoteId::new("103")]);
    assert!(records.iter().all(|r| r.status == MediaStatus::Confirmed));
    assert_eq!(
        remote.calls(),
        vec![RemoteCall::Upload(vec!["a.jpg".into(), "b.jpg".into(), "c.jpg".into()])]
    );
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn staging_appends_transferring_records_at_tail() {
    let remote = Arc::new(FakeRemote::new());
    let (store, sync, _notices) = setup(&remote, SyncOptions::default());

    let first = sync.uploads.stage(files(&["a.jpg"])).unwrap();
    let second = sync.uploads.stage(files(&["b.jpg", "c.jpg"])).unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(store.len(), 3);
    assert_eq!(store.position_of(second.local_ids()[1]), Some(2));
    assert!(store
        .snapshot()
        .iter()
        .all(|r| r.status == MediaStatus::Transferring && r.remote_id.is_none()));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn cancel_during_transfer_deletes_the_late_identity() {
    let remote = Arc::new(FakeRemote::new());
    remote.hold_uploads();
    let (store, sync, mut notices) = setup(&remote, SyncOptions::default());

    let batch = sync.uploads.stage(files(&["keep.jpg", "drop.jpg"])).unwrap();
    let dropped = batch.local_ids()[1];
    let uploads = sync.uploads.clone();
    let handle = tokio::spawn(async move { uploads.transfer(batch).await });
    remote.wait_for_uploads(1).await;

    assert_eq!(sync.removal.request(dropped), Removal::Cancelled(dropped));
    assert!(!store.contains(dropped));

    remote.release_uploads(1);
    let report = handle.await.unwrap().unwrap();

    assert_eq!(report.cleaned_up, vec![RemoteId::new("102")]);
    assert_eq!(remote.delete_calls(), vec![RemoteId::new("102")]);
    assert_eq!(remote.persisted(), vec![RemoteId::new("101")]);
    let records = store.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].display_name, "keep.jpg");
    assert_eq!(records[0].status, MediaStatus::Confirmed);
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn failed_batch_flags_every_record_and_notifies_once() {
    let remote = Arc::new(FakeRemote::new());
    remote.fail_uploads_with(403);
    let (store, sync, mut notices) = setup(&remote, SyncOptions::default());

    let err = sync.uploads.upload(files(&["a.jpg", "b.jpg"])).await.unwrap_err();
    assert!(matches!(err, SyncError::ApiClientError(_)));

    let records = store.snapshot();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == MediaStatus::Errored));
    assert!(records.iter().all(|r| r.remote_id.is_none()));

    let notice = notices.try_recv().unwrap();
    match notice.kind {
        NoticeKind::UploadFailed { files, reason } => {
            assert_eq!(files, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
            assert!(reason.contains("403"));
        }
        other => panic!("unexpected notice: {:?}", other),
    }
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn short_answer_is_a_full_batch_failure() {
    let remote = Arc::new(FakeRemote::new());
    remote.answer_short();
    let (store, sync, mut notices) = setup(&remote, SyncOptions::default());

    let err = sync.uploads.upload(files(&["a.jpg", "b.jpg"])).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Correlation {
            expected: 2,
            received: 1
        }
    ));
    assert!(store
        .snapshot()
        .iter()
        .all(|r| r.status == MediaStatus::Errored && r.remote_id.is_none()));
    assert!(notices.try_recv().is_ok());
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_batches_resolve_independently() {
    let remote = Arc::new(FakeRemote::new());
    remote.hold_uploads();
    let (store, sync, _notices) = setup(&remote, SyncOptions::default());

    let first = sync.uploads.stage(files(&["a.jpg", "b.jpg"])).unwrap();
    let second = sync.uploads.stage(files(&["c.jpg"])).unwrap();
    let (u1, u2) = (sync.uploads.clone(), sync.uploads.clone());
    let h1 = tokio::spawn(async move { u1.transfer(first).await });
    let h2 = tokio::spawn(async move { u2.transfer(second).await });
    remote.wait_for_uploads(2).await;
    remote.release_uploads(2);

    let r1 = h1.await.unwrap().unwrap();
    let r2 = h2.await.unwrap().unwrap();
    assert_eq!(r1.confirmed.len(), 2);
    assert_eq!(r2.confirmed.len(), 1);
    assert!(r1
        .confirmed
        .iter()
        .all(|e| r2.confirmed.iter().all(|o| o.remote_id != e.remote_id)));

    let records = store.snapshot();
    let names: Vec<&str> = records.iter().map(|r| r.display_name.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    assert!(records.iter().all(|r| r.status == MediaStatus::Confirmed));
}

#[tokio::test(start_paused = true)]
async fn stuck_transfer_times_out_as_failure() {
    let remote = Arc::new(FakeRemote::new());
    remote.hold_uploads();
    let options = SyncOptions {
        upload_timeout: Some(Duration::from_secs(30)),
    };
    let (store, sync, mut notices) = setup(&remote, options);

    let err = sync.uploads.upload(files(&["slow.mp4"])).await.unwrap_err();
    assert!(matches!(err, SyncError::Timeout(_)));
    assert_eq!(store.snapshot()[0].status, MediaStatus::Errored);
    assert!(notices.try_recv().is_ok());
}

#[tokio::test]
async fn failure_after_full_cancel_stays_silent() {
    let remote = Arc::new(FakeRemote::new());
    remote.hold_uploads();
    remote.fail_uploads_with(500);
    let (store, sync, mut notices) = setup(&remote, SyncOptions::default());

    let batch = sync.uploads.stage(files(&["a.jpg"])).unwrap();
    let local_id = batch.local_ids()[0];
    let uploads = sync.uploads.clone();
    let handle = tokio::spawn(async move { uploads.transfer(batch).await });
    remote.wait_for_uploads(1).await;
    let _ = sync.removal.request(local_id);
    remote.release_uploads(1);

    assert!(handle.await.unwrap().is_err());
    assert!(store.is_empty());
    assert!(remote.delete_calls().is_empty());
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let remote = Arc::new(FakeRemote::new());
    let (store, sync, _notices) = setup(&remote, SyncOptions::default());
    let err = sync.uploads.upload(Vec::new()).await.unwrap_err();
    assert!(matches!(err, SyncError::EmptySelection));
    assert!(store.is_empty());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn failed_cleanup_after_cancel_is_logged_only() {
    let remote = Arc::new(FakeRemote::new());
    remote.hold_uploads();
    remote.fail_deletes();
    let (store, sync, mut notices) = setup(&remote, SyncOptions::default());

    let batch = sync.uploads.stage(files(&["keep.jpg", "drop.jpg"])).unwrap();
    let dropped = batch.local_ids()[1];
    let uploads = sync.uploads.clone();
    let handle = tokio::spawn(async move { uploads.transfer(batch).await });
    remote.wait_for_uploads(1).await;
    assert_eq!(sync.removal.request(dropped), Removal::Cancelled(dropped));
    remote.release_uploads(1);

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.cleanup_failed, vec![RemoteId::new("102")]);
    assert!(report.cleaned_up.is_empty());
    assert_eq!(report.confirmed.len(), 1);
    assert_eq!(remote.delete_calls(), vec![RemoteId::new("102")]);
    assert_eq!(store.len(), 1);
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn record_changed_during_transfer_is_not_confirmed() {
    let remote = Arc::new(FakeRemote::new());
    remote.hold_uploads();
    let (store, sync, mut notices) = setup(&remote, SyncOptions::default());

    let batch = sync
        .uploads
        .stage(files(&["rebound.jpg", "errored.jpg", "ok.jpg"]))
        .unwrap();
    let ids = batch.local_ids();
    let uploads = sync.uploads.clone();
    let handle = tokio::spawn(async move { uploads.transfer(batch).await });
    remote.wait_for_uploads(1).await;

    // Another writer got to both records before the answer arrived.
    assert!(store.bind_remote_id(ids[0], RemoteId::new("999")));
    assert!(store.update_status(ids[1], MediaStatus::Errored));
    remote.release_uploads(1);

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.confirmed.len(), 1);
    assert_eq!(report.confirmed[0].local_id, ids[2]);
    assert_eq!(
        report.cleaned_up,
        vec![RemoteId::new("101"), RemoteId::new("102")]
    );
    assert_eq!(remote.persisted(), vec![RemoteId::new("103")]);
    assert_eq!(store.get(ids[0]).unwrap().status, MediaStatus::Transferring);
    assert_eq!(store.get(ids[1]).unwrap().status, MediaStatus::Errored);
    assert_eq!(store.get(ids[2]).unwrap().status, MediaStatus::Confirmed);
    assert!(notices.try_recv().is_err());
}
