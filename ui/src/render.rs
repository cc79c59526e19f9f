//! Pure projection from store state to preview tiles.

use api_client::MediaKind;
use bytes::Bytes;
use std::fmt;
use store::{LocalId, MediaRecord, MediaStatus, MediaStore, SourceRef, StoreEvent};
use tokio::sync::mpsc;

const VIDEO_GLYPH: &str = "▶";
const UNKNOWN_GLYPH: &str = "?";

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Url(String),
    Payload(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Thumbnail {
    Image(ImageSource),
    Glyph(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVariant {
    Neutral,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewTile {
    pub local_id: LocalId,
    pub position: usize,
    pub display_name: String,
    pub thumbnail: Thumbnail,
    pub status_label: &'static str,
    pub variant: StatusVariant,
    pub draggable: bool,
}

impl fmt::Display for PreviewTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>3}. {} [{}]",
            self.position, self.display_name, self.status_label
        )
    }
}

fn status_display(status: MediaStatus) -> (&'static str, StatusVariant) {
    match status {
        MediaStatus::Hydrated => ("Existing", StatusVariant::Ok),
        MediaStatus::Pending | MediaStatus::Transferring => ("Uploading...", StatusVariant::Neutral),
        MediaStatus::Confirmed => ("Uploaded", StatusVariant::Ok),
        MediaStatus::Errored => ("Error", StatusVariant::Error),
        MediaStatus::Cancelled | MediaStatus::Deleted => ("", StatusVariant::Neutral),
    }
}

fn thumbnail(record: &MediaRecord) -> Thumbnail {
    match (record.kind, &record.source) {
        (MediaKind::Image, SourceRef::Remote(url)) => Thumbnail::Image(ImageSource::Url(url.clone())),
        (MediaKind::Image, SourceRef::Local { payload, .. }) => {
            Thumbnail::Image(ImageSource::Payload(payload.clone()))
        }
        (MediaKind::Video, _) => Thumbnail::Glyph(VIDEO_GLYPH),
        (MediaKind::Unknown, _) => Thumbnail::Glyph(UNKNOWN_GLYPH),
    }
}

pub fn render_record(record: &MediaRecord) -> PreviewTile {
    let (status_label, variant) = status_display(record.status);
    PreviewTile {
        local_id: record.local_id,
        position: record.position,
        display_name: record.display_name.clone(),
        thumbnail: thumbnail(record),
        status_label,
        variant,
        draggable: record.is_draggable(),
    }
}

pub fn render(records: &[MediaRecord]) -> Vec<PreviewTile> {
    records.iter().map(render_record).collect()
}

/// Keeps a rendered frame in step with store notifications.
pub struct Renderer {
    store: MediaStore,
    events: mpsc::UnboundedReceiver<StoreEvent>,
    frame: Vec<PreviewTile>,
    frames_rendered: u64,
}

impl Renderer {
    pub fn attach(store: &MediaStore) -> Self {
        let events = store.subscribe();
        let frame = render(&store.snapshot());
        Renderer {
            store: store.clone(),
            events,
            frame,
            frames_rendered: 1,
        }
    }

    pub fn frame(&self) -> &[PreviewTile] {
        &self.frame
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Re-render if anything changed since the last frame.
    pub fn refresh(&mut self) -> bool {
        let mut changed = false;
        while self.events.try_recv().is_ok() {
            changed = true;
        }
        if changed {
            self.redraw();
        }
        changed
    }

    /// Wait for the next mutation and render the resulting frame.
    pub async fn next_frame(&mut self) -> Option<&[PreviewTile]> {
        self.events.recv().await?;
        while self.events.try_recv().is_ok() {}
        self.redraw();
        Some(&self.frame)
    }

    fn redraw(&mut self) {
        self.frame = render(&self.store.snapshot());
        self.frames_rendered += 1;
    }
}
