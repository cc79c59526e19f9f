//! API client module for the catalog media endpoints.
//!
//! The remote store is the durable owner of media membership and order. This
//! crate holds the wire types shared by the rest of the workspace and the
//! [`RemoteMediaStore`] seam the sync layer talks to.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Header carrying the anti-forgery token on every mutating request.
pub const CSRF_HEADER: &str = "X-CSRFToken";
/// Multipart field name used for every file of an upload batch.
pub const UPLOAD_FIELD: &str = "files";
/// Placeholder substituted by the remote identity in the delete endpoint.
pub const ID_PLACEHOLDER: &str = "{id}";

const ERROR_BODY_LIMIT: usize = 400;

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("Request Error: {0}")]
    RequestError(String),
    #[error("Server returned {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Endpoint not configured: {0}")]
    MissingEndpoint(&'static str),
    #[error("Other Error: {0}")]
    Other(String),
}

/// Identity assigned by the remote store once an item is persisted.
///
/// The backend may emit identities as JSON numbers or strings; both are
/// normalized to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        RemoteId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for RemoteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RemoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => RemoteId(n.to_string()),
            Raw::Text(s) => RemoteId(s),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MediaKind {
    Image,
    Video,
    #[default]
    Unknown,
}

impl MediaKind {
    /// Classify a MIME type by its top-level type.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl Serialize for MediaKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MediaKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            Some("image") => MediaKind::Image,
            Some("video") => MediaKind::Video,
            _ => MediaKind::Unknown,
        })
    }
}

/// One entry of the snapshot embedded in the page at widget start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingMedia {
    pub id: RemoteId,
    #[serde(default)]
    pub media_type: MediaKind,
    pub file_url: String,
    pub file_name: String,
}

/// Parse the embedded snapshot of already-persisted media.
pub fn parse_existing_media(json: &str) -> Result<Vec<ExistingMedia>, ApiClientError> {
    serde_json::from_str(json).map_err(|e| ApiClientError::MalformedResponse(e.to_string()))
}

/// A user-selected file that has not been transferred yet.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub payload: Bytes,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        UploadFile {
            file_name: file_name.into(),
            content_type: content_type.into(),
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.content_type)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadResponse {
    Wrapped { ids: Vec<RemoteId> },
    Bare(Vec<RemoteId>),
}

impl UploadResponse {
    fn into_ids(self) -> Vec<RemoteId> {
        match self {
            UploadResponse::Wrapped { ids } => ids,
            UploadResponse::Bare(ids) => ids,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReorderRequest<'a> {
    order: &'a [RemoteId],
}

/// The authoritative store the widget synchronizes with.
///
/// `upload` must return one identity per file, in the order the files were
/// attached to the request.
#[async_trait]
pub trait RemoteMediaStore: Send + Sync {
    async fn upload(&self, files: &[UploadFile]) -> Result<Vec<RemoteId>, ApiClientError>;
    async fn reorder(&self, order: &[RemoteId]) -> Result<(), ApiClientError>;
    async fn delete(&self, id: &RemoteId) -> Result<(), ApiClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEndpoints {
    pub upload_url: String,
    pub reorder_url: Option<String>,
    pub delete_url_template: Option<String>,
}

impl MediaEndpoints {
    pub fn delete_url(&self, id: &RemoteId) -> Option<String> {
        self.delete_url_template
            .as_ref()
            .map(|template| template.replace(ID_PLACEHOLDER, id.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct MediaApiClient {
    client: reqwest::Client,
    endpoints: MediaEndpoints,
    csrf_token: String,
}

impl MediaApiClient {
    pub fn new(endpoints: MediaEndpoints, csrf_token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints, csrf_token)
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoints: MediaEndpoints,
        csrf_token: impl Into<String>,
    ) -> Self {
        MediaApiClient {
            client,
            endpoints,
            csrf_token: csrf_token.into(),
        }
    }

    pub fn endpoints(&self) -> &MediaEndpoints {
        &self.endpoints
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let body: String = text.chars().take(ERROR_BODY_LIMIT).collect();
        Err(ApiClientError::ServerError {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteMediaStore for MediaApiClient {
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, files)))]
    async fn upload(&self, files: &[UploadFile]) -> Result<Vec<RemoteId>, ApiClientError> {
        let mut form = Form::new();
        for file in files {
            let part = Part::stream_with_length(file.payload.clone(), file.payload.len() as u64)
                .file_name(file.file_name.clone())
                .mime_str(&file.content_type)
                .map_err(|e| ApiClientError::Other(format!("{}: {}", file.file_name, e)))?;
            form = form.part(UPLOAD_FIELD, part);
        }

        let response = self
            .client
            .post(&self.endpoints.upload_url)
            .header(CSRF_HEADER, &self.csrf_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;
        let parsed: UploadResponse = serde_json::from_slice(&body)
            .map_err(|e| ApiClientError::MalformedResponse(e.to_string()))?;
        let ids = parsed.into_ids();
        tracing::debug!(files = files.len(), ids = ids.len(), "Upload batch answered");
        Ok(ids)
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    async fn reorder(&self, order: &[RemoteId]) -> Result<(), ApiClientError> {
        let url = self
            .endpoints
            .reorder_url
            .as_ref()
            .ok_or(ApiClientError::MissingEndpoint("reorder_url"))?;

        let response = self
            .client
            .post(url)
            .header(CSRF_HEADER, &self.csrf_token)
            .header(CONTENT_TYPE, "application/json")
            .json(&ReorderRequest { order })
            .send()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;
        Self::check_status(response).await?;
        Ok(())
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    async fn delete(&self, id: &RemoteId) -> Result<(), ApiClientError> {
        let url = self
            .endpoints
            .delete_url(id)
            .ok_or(ApiClientError::MissingEndpoint("delete_url_template"))?;

        let response = self
            .client
            .post(&url)
            .header(CSRF_HEADER, &self.csrf_token)
            .send()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;
        Self::check_status(response).await?;
        Ok(())
    }
}
