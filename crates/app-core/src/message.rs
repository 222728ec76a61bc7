//! Message model
//!
//! Messages are a tagged variant over text, image, audio, and captioned-image
//! payloads with a required discriminant, validated once at the repository
//! boundary ([`Message::from_row`]) so rendering code never sees a malformed
//! record. Messages are immutable and append-only; ordering is by creation
//! time ascending with ties broken by id.

use backend_client::realtime::MessageRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::ConversationKey;

/// Maximum text length for a chat message.
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Errors from message validation and persistence.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Row carried an unrecognized kind discriminant.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// Row is missing a required field.
    #[error("message row missing {0}")]
    MissingField(&'static str),

    /// Text body exceeds the maximum length.
    #[error("message too long: {length} exceeds maximum {max}")]
    MessageTooLong {
        /// Actual message length.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Backend failure while reading or writing messages.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for message operations.
pub type Result<T> = std::result::Result<T, MessageError>;

/// Message kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Plain text; `content` is the body.
    #[serde(rename = "text")]
    Text,
    /// Image; `content` is the media URL.
    #[serde(rename = "image")]
    Image,
    /// Audio clip; `content` is the media URL.
    #[serde(rename = "audio")]
    Audio,
    /// Image with a text caption.
    #[serde(rename = "text+image")]
    TextImage,
}

impl MessageKind {
    /// The wire discriminant for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::TextImage => "text+image",
        }
    }

    /// Parse a wire discriminant.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "text+image" => Some(Self::TextImage),
            _ => None,
        }
    }

    /// Whether `content` holds a media URL for this kind.
    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// An immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: String,
    /// Sender display name.
    pub sender: String,
    /// Canonical conversation key.
    pub conversation: ConversationKey,
    /// Kind discriminant.
    pub kind: MessageKind,
    /// Text body or media URL, depending on `kind`.
    pub content: String,
    /// Caption; only meaningful for image kinds.
    pub caption: Option<String>,
    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Validate and normalize a raw table row into the local message shape.
    ///
    /// Rejects rows with an unknown kind or missing id/sender/content. A
    /// caption on a non-image kind is dropped rather than rejected, since it
    /// cannot be rendered for those kinds anyway.
    pub fn from_row(row: MessageRow) -> Result<Self> {
        let kind =
            MessageKind::parse(&row.kind).ok_or_else(|| MessageError::UnknownKind(row.kind))?;
        if row.id.trim().is_empty() {
            return Err(MessageError::MissingField("id"));
        }
        if row.sender.trim().is_empty() {
            return Err(MessageError::MissingField("sender"));
        }
        if row.content.trim().is_empty() {
            return Err(MessageError::MissingField("content"));
        }

        let caption = match kind {
            MessageKind::Image | MessageKind::TextImage => row.caption,
            MessageKind::Text | MessageKind::Audio => None,
        };

        Ok(Self {
            id: row.id,
            sender: row.sender,
            conversation: ConversationKey::new(row.channel_name),
            kind,
            content: row.content,
            caption,
            created_at: row.created_at,
        })
    }

    /// Ordering key: creation time ascending, ties broken by id.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, &self.id)
    }
}

/// What the viewer is sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingContent {
    /// A plain text message.
    Text(String),
    /// An uploaded image, optionally captioned.
    Image {
        /// Stored media URL.
        url: String,
        /// Optional caption.
        caption: Option<String>,
    },
    /// An uploaded audio clip.
    Audio {
        /// Stored media URL.
        url: String,
    },
}

/// A message ready for insertion; id and creation time are server-assigned.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    /// Sender display name.
    pub sender: String,
    /// Canonical conversation key.
    pub channel_name: ConversationKey,
    /// Kind discriminant.
    pub kind: MessageKind,
    /// Text body or media URL.
    pub content: String,
    /// Caption for image kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl NewMessage {
    /// Build an insert row for `content` sent by `sender` into the
    /// conversation identified by `key`.
    pub fn compose(sender: &str, key: ConversationKey, content: OutgoingContent) -> Result<Self> {
        let (kind, body, caption) = match content {
            OutgoingContent::Text(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(MessageError::MissingField("content"));
                }
                if text.len() > MAX_MESSAGE_LENGTH {
                    return Err(MessageError::MessageTooLong {
                        length: text.len(),
                        max: MAX_MESSAGE_LENGTH,
                    });
                }
                (MessageKind::Text, text, None)
            }
            OutgoingContent::Image { url, caption } => {
                if url.trim().is_empty() {
                    return Err(MessageError::MissingField("content"));
                }
                let caption = caption.filter(|c| !c.trim().is_empty());
                let kind = if caption.is_some() {
                    MessageKind::TextImage
                } else {
                    MessageKind::Image
                };
                (kind, url, caption)
            }
            OutgoingContent::Audio { url } => {
                if url.trim().is_empty() {
                    return Err(MessageError::MissingField("content"));
                }
                (MessageKind::Audio, url, None)
            }
        };

        Ok(Self {
            sender: sender.to_string(),
            channel_name: key,
            kind,
            content: body,
            caption,
        })
    }
}
