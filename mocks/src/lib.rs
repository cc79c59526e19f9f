use api_client::{ApiClientError, MediaEndpoints, RemoteId, RemoteMediaStore, UploadFile};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

pub use wiremock::{matchers, Mock, MockServer, Request, ResponseTemplate};

pub const UPLOAD_PATH: &str = "/media/upload";
pub const REORDER_PATH: &str = "/media/reorder";

/// Start a new wiremock server standing in for the catalog backend.
pub async fn media_server() -> MockServer {
    MockServer::start().await
}

/// Endpoints pointing at `server`, matching the helpers below.
pub fn endpoints(server: &MockServer) -> MediaEndpoints {
    MediaEndpoints {
        upload_url: format!("{}{}", server.uri(), UPLOAD_PATH),
        reorder_url: Some(format!("{}{}", server.uri(), REORDER_PATH)),
        delete_url_template: Some(format!("{}/media/{{id}}/delete", server.uri())),
    }
}

/// Answer uploads with the given identities.
pub async fn expect_upload(server: &MockServer, ids: &[u64]) {
    Mock::given(matchers::method("POST"))
        .and(matchers::path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ids": ids })))
        .mount(server)
        .await;
}

pub async fn expect_upload_status(server: &MockServer, status: u16) {
    Mock::given(matchers::method("POST"))
        .and(matchers::path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string("upload rejected"))
        .mount(server)
        .await;
}

pub async fn expect_reorder(server: &MockServer, status: u16) {
    Mock::given(matchers::method("POST"))
        .and(matchers::path(REORDER_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub async fn expect_delete(server: &MockServer, id: &str, status: u16) {
    Mock::given(matchers::method("POST"))
        .and(matchers::path(format!("/media/{}/delete", id)))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Upload(Vec<String>),
    Reorder(Vec<RemoteId>),
    Delete(RemoteId),
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    persisted: Vec<RemoteId>,
    calls: Vec<RemoteCall>,
    upload_status: Option<u16>,
    short_uploads: bool,
    fail_reorder: bool,
    fail_delete: bool,
}

/// In-memory remote store recording every call.
///
/// Uploads can be held open with [`FakeRemote::hold_uploads`] to exercise
/// what happens while a batch is in flight.
pub struct FakeRemote {
    state: Mutex<FakeState>,
    held: AtomicBool,
    gate: Semaphore,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        FakeRemote {
            state: Mutex::new(FakeState {
                next_id: 100,
                ..FakeState::default()
            }),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    /// Seed the remote with already-persisted identities.
    pub fn with_persisted(ids: &[&str]) -> Self {
        let remote = Self::new();
        remote.state.lock().unwrap().persisted = ids.iter().map(|id| RemoteId::new(*id)).collect();
        remote
    }

    pub fn hold_uploads(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release_uploads(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn fail_uploads_with(&self, status: u16) {
        self.state.lock().unwrap().upload_status = Some(status);
    }

    /// Answer uploads with one identity fewer than files sent.
    pub fn answer_short(&self) {
        self.state.lock().unwrap().short_uploads = true;
    }

    pub fn fail_reorders(&self) {
        self.state.lock().unwrap().fail_reorder = true;
    }

    pub fn fail_deletes(&self) {
        self.state.lock().unwrap().fail_delete = true;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<RemoteId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn upload_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Upload(_)))
            .count()
    }

    /// The durable order as the remote sees it.
    pub fn persisted(&self) -> Vec<RemoteId> {
        self.state.lock().unwrap().persisted.clone()
    }

    /// Yield until `count` uploads have reached the remote.
    pub async fn wait_for_uploads(&self, count: usize) {
        while self.upload_calls() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl RemoteMediaStore for FakeRemote {
    async fn upload(&self, files: &[UploadFile]) -> Result<Vec<RemoteId>, ApiClientError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(RemoteCall::Upload(files.iter().map(|f| f.file_name.clone()).collect()));

        if self.held.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| ApiClientError::Other(e.to_string()))?;
            permit.forget();
        }

        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.upload_status {
            return Err(ApiClientError::ServerError {
                status,
                body: "injected failure".into(),
            });
        }
        let mut ids = Vec::with_capacity(files.len());
        for _ in files {
            state.next_id += 1;
            let id = RemoteId::new(state.next_id.to_string());
            state.persisted.push(id.clone());
            ids.push(id);
        }
        if state.short_uploads {
            ids.pop();
        }
        Ok(ids)
    }

    async fn reorder(&self, order: &[RemoteId]) -> Result<(), ApiClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RemoteCall::Reorder(order.to_vec()));
        if state.fail_reorder {
            return Err(ApiClientError::ServerError {
                status: 500,
                body: "injected failure".into(),
            });
        }
        let mut next: Vec<RemoteId> = order
            .iter()
            .filter(|id| state.persisted.contains(id))
            .cloned()
            .collect();
        let rest: Vec<RemoteId> = state
            .persisted
            .iter()
            .filter(|id| !order.contains(id))
            .cloned()
            .collect();
        next.extend(rest);
        state.persisted = next;
        Ok(())
    }

    async fn delete(&self, id: &RemoteId) -> Result<(), ApiClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RemoteCall::Delete(id.clone()));
        if state.fail_delete {
            return Err(ApiClientError::ServerError {
                status: 500,
                body: "injected failure".into(),
            });
        }
        state.persisted.retain(|p| p != id);
        Ok(())
    }
}
