//! Messaging transport seam
//!
//! The delivery pipeline only sees [`MediaTransport`]; the production
//! implementation is the Telegram Bot API client in [`telegram`].

mod telegram;

pub use telegram::TelegramBot;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Per-attempt send failure taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Upstream flood control; retry after the server-suggested wait
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The request timed out; terminal for this channel attempt
    #[error("send timed out")]
    Timeout,

    /// Any other transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Media kind as the transport understands it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Infer the kind from a stored content type; photos are the default
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video") {
            Self::Video
        } else {
            Self::Photo
        }
    }
}

/// One item of an outgoing media batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub kind: MediaKind,
    /// Publicly reachable URL of the media file
    pub url: String,
    /// Caption; set on the first item of a batch only
    pub caption: Option<String>,
}

/// Messaging transport consumed by the delivery pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTransport: Send + Sync + 'static {
    /// Deliver a media batch to a channel
    async fn send_media_group(
        &self,
        chat_id: &str,
        media: &[MediaItem],
    ) -> std::result::Result<(), SendError>;

    /// Deliver a plain text message to a channel
    async fn send_message(&self, chat_id: &str, text: &str)
        -> std::result::Result<(), SendError>;
}
