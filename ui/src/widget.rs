use crate::render::{render, PreviewTile};
use api_client::{
    parse_existing_media, MediaApiClient, MediaEndpoints, RemoteMediaStore, UploadFile,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use store::{LocalId, MediaStore};
use sync::{
    BatchId, BatchReport, DeleteRequest, MediaSync, Notice, Notifier, Removal, ReorderOutcome,
    SyncOptions,
};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing upload endpoint (upload_url)")]
    MissingUploadUrl,
    #[error("Missing anti-forgery token (csrf_token)")]
    MissingCsrfToken,
}

/// Endpoints and token the widget is embedded with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub upload_url: Option<String>,
    pub reorder_url: Option<String>,
    pub delete_url_template: Option<String>,
    pub csrf_token: Option<String>,
    pub upload_timeout_secs: Option<u64>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl WidgetConfig {
    pub fn endpoints(&self) -> Result<MediaEndpoints, ConfigError> {
        let upload_url = present(&self.upload_url).ok_or(ConfigError::MissingUploadUrl)?;
        Ok(MediaEndpoints {
            upload_url: upload_url.to_string(),
            reorder_url: present(&self.reorder_url).map(str::to_string),
            delete_url_template: present(&self.delete_url_template).map(str::to_string),
        })
    }

    pub fn csrf_token(&self) -> Result<&str, ConfigError> {
        present(&self.csrf_token).ok_or(ConfigError::MissingCsrfToken)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoints()?;
        self.csrf_token()?;
        Ok(())
    }

    /// A zero timeout disables the bound.
    pub fn sync_options(&self) -> SyncOptions {
        match self.upload_timeout_secs {
            Some(0) => SyncOptions {
                upload_timeout: None,
            },
            Some(secs) => SyncOptions {
                upload_timeout: Some(Duration::from_secs(secs)),
            },
            None => SyncOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    FilesSelected(Vec<UploadFile>),
    UploadFinished(BatchId, Result<BatchReport, String>),
    Dropped { source: LocalId, target: LocalId },
    ReorderFinished(Result<ReorderOutcome, String>),
    DeleteClicked(LocalId),
    ConfirmDelete,
    CancelDelete,
    DeleteFinished(LocalId, Result<(), String>),
    DismissNotice(usize),
    EscapePressed,
}

/// Deferred work produced by [`MediaManager::update`], resolving to the
/// follow-up message.
#[must_use]
pub struct Command(Option<BoxFuture<'static, Message>>);

impl Command {
    pub fn none() -> Self {
        Command(None)
    }

    pub fn perform<F, T>(future: F, map: impl FnOnce(T) -> Message + Send + 'static) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Command(Some(future.map(map).boxed()))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn into_future(self) -> Option<BoxFuture<'static, Message>> {
        self.0
    }

    pub async fn resolve(self) -> Option<Message> {
        match self.0 {
            Some(future) => Some(future.await),
            None => None,
        }
    }
}

pub struct MediaManager {
    store: MediaStore,
    sync: MediaSync,
    notice_receiver: mpsc::UnboundedReceiver<Notice>,
    notices: Vec<Notice>,
    deleting: Option<DeleteRequest>,
    uploads_in_flight: usize,
}

impl MediaManager {
    /// Build the widget against the HTTP backend described by `config`.
    pub fn connect(config: &WidgetConfig, snapshot: Option<&str>) -> Result<Self, ConfigError> {
        let parts = config
            .endpoints()
            .and_then(|endpoints| Ok((endpoints, config.csrf_token()?)));
        let (endpoints, token) = match parts {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!(error = %e, "Media manager disabled");
                return Err(e);
            }
        };
        let remote = Arc::new(MediaApiClient::new(endpoints, token));
        Self::new(config, snapshot, remote)
    }

    /// Validate configuration, then hydrate from the embedded snapshot.
    /// Invalid configuration yields no widget at all.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(config, snapshot, remote)))]
    pub fn new(
        config: &WidgetConfig,
        snapshot: Option<&str>,
        remote: Arc<dyn RemoteMediaStore>,
    ) -> Result<Self, ConfigError> {
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Media manager disabled");
            return Err(e);
        }

        let store = MediaStore::new();
        if let Some(json) = snapshot {
            match parse_existing_media(json) {
                Ok(existing) => {
                    store.hydrate(&existing);
                }
                Err(e) => tracing::error!(error = %e, "Failed to parse existing media snapshot"),
            }
        }

        let (notifier, notice_receiver) = Notifier::channel();
        let sync = MediaSync::new(store.clone(), remote, notifier, config.sync_options());
        Ok(MediaManager {
            store,
            sync,
            notice_receiver,
            notices: Vec::new(),
            deleting: None,
            uploads_in_flight: 0,
        })
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub fn tiles(&self) -> Vec<PreviewTile> {
        render(&self.store.snapshot())
    }

    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploads_in_flight > 0
    }

    pub fn deleting(&self) -> Option<LocalId> {
        self.deleting.as_ref().map(|r| r.local_id)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn notice_count(&self) -> usize {
        self.notices.len()
    }

    /// Pull notices raised by finished operations into the visible list.
    pub fn poll_notices(&mut self) -> usize {
        let mut received = 0;
        while let Ok(notice) = self.notice_receiver.try_recv() {
            self.notices.push(notice);
            received += 1;
        }
        received
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub fn update(&mut self, message: Message) -> Command {
        match message {
            Message::FilesSelected(files) => {
                if files.is_empty() {
                    return Command::none();
                }
                let batch = match self.sync.uploads.stage(files) {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::warn!(error = %e, "Nothing to upload");
                        return Command::none();
                    }
                };
                self.uploads_in_flight += 1;
                let id = batch.id();
                let uploads = self.sync.uploads.clone();
                return Command::perform(
                    async move { uploads.transfer(batch).await.map_err(|e| e.to_string()) },
                    move |result| Message::UploadFinished(id, result),
                );
            }
            Message::UploadFinished(id, result) => {
                self.uploads_in_flight = self.uploads_in_flight.saturating_sub(1);
                if let Err(e) = result {
                    tracing::debug!(batch = %id, error = %e, "Upload batch finished with error");
                }
                self.poll_notices();
            }
            Message::Dropped { source, target } => match self.sync.reorder.apply(source, target) {
                Ok(Some(order)) => {
                    let reorder = self.sync.reorder.clone();
                    return Command::perform(
                        async move { reorder.push(order).await.map_err(|e| e.to_string()) },
                        Message::ReorderFinished,
                    );
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "Drop ignored"),
            },
            Message::ReorderFinished(_) => {
                self.poll_notices();
            }
            Message::DeleteClicked(local_id) => match self.sync.removal.request(local_id) {
                Removal::NeedsConfirmation(request) => {
                    self.deleting = Some(request);
                }
                Removal::Cancelled(_) | Removal::Discarded(_) => {}
                Removal::NotFound(id) => tracing::debug!(local_id = %id, "Delete on absent record"),
            },
            Message::ConfirmDelete => {
                if let Some(request) = self.deleting.take() {
                    let local_id = request.local_id;
                    let removal = self.sync.removal.clone();
                    return Command::perform(
                        async move { removal.confirm(request).await.map_err(|e| e.to_string()) },
                        move |result| Message::DeleteFinished(local_id, result),
                    );
                }
            }
            Message::CancelDelete => {
                self.deleting = None;
            }
            Message::DeleteFinished(_, _) => {
                self.poll_notices();
            }
            Message::DismissNotice(idx) => {
                if idx < self.notices.len() {
                    self.notices.remove(idx);
                }
            }
            Message::EscapePressed => {
                if self.deleting.is_some() {
                    return self.update(Message::CancelDelete);
                }
            }
        }
        Command::none()
    }

    /// Run a message and every follow-up it produces to completion.
    pub async fn dispatch(&mut self, message: Message) {
        let mut command = self.update(message);
        while let Some(next) = command.resolve().await {
            command = self.update(next);
        }
    }
}
