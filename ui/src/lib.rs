//! User interface module for the media manager widget.
//!
//! The widget is driven by [`Message`]s. [`MediaManager::update`] applies the
//! optimistic part of each action right away and hands back a [`Command`]
//! carrying the network part; its result comes back as another message.

mod render;
mod widget;

pub use render::{
    render, render_record, ImageSource, PreviewTile, Renderer, StatusVariant, Thumbnail,
};
pub use widget::{Command, ConfigError, MediaManager, Message, WidgetConfig};
