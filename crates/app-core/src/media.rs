//! Media attachments
//!
//! Uploads image and audio attachments to blob storage and mints short-lived
//! signed URLs for display. Object paths are namespaced by sender and made
//! unique with a timestamp plus an in-process counter so concurrent uploads
//! from one client never collide.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use backend_client::storage::BlobClient;

/// Bucket holding chat attachments.
pub const MEDIA_BUCKET: &str = "chat-media";

/// Largest accepted attachment, in bytes.
pub const MAX_UPLOAD_SIZE: usize = 5_000_000;

/// Lifetime of signed display URLs, in seconds.
pub const SIGNED_URL_TTL_SECS: u64 = 60;

/// Errors from attachment handling.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The MIME type is not one the chat renders.
    #[error("unsupported attachment type: {0}")]
    UnsupportedType(String),

    /// The attachment exceeds [`MAX_UPLOAD_SIZE`].
    #[error("attachment is {size} bytes, limit is {max}")]
    TooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// Blob storage rejected or failed the request.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result alias for media operations.
pub type Result<T> = std::result::Result<T, MediaError>;

/// Broad category of an attachment, derived from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// A still image.
    Image,
    /// A recorded audio clip.
    Audio,
}

impl AttachmentKind {
    /// Classify a MIME type and pick the object extension for it.
    pub fn from_mime(mime: &str) -> Result<(Self, &'static str)> {
        match mime {
            "image/png" => Ok((Self::Image, "png")),
            "image/jpeg" => Ok((Self::Image, "jpg")),
            "image/gif" => Ok((Self::Image, "gif")),
            "image/webp" => Ok((Self::Image, "webp")),
            "audio/webm" => Ok((Self::Audio, "webm")),
            other => Err(MediaError::UnsupportedType(other.to_string())),
        }
    }
}

/// An uploaded attachment with a display URL.
#[derive(Debug, Clone)]
pub struct StoredAttachment {
    /// What the attachment is.
    pub kind: AttachmentKind,
    /// Object path inside [`MEDIA_BUCKET`].
    pub path: String,
    /// Signed URL valid for [`SIGNED_URL_TTL_SECS`] seconds.
    pub url: String,
}

/// Uploads attachments and mints signed URLs.
#[derive(Debug, Clone)]
pub struct MediaService {
    blobs: BlobClient,
    sequence: Arc<AtomicU64>,
}

impl MediaService {
    /// Create a service over a blob client.
    pub fn new(blobs: BlobClient) -> Self {
        Self {
            blobs,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Upload an attachment and return its path and a signed display URL.
    pub async fn upload_attachment(
        &self,
        sender: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredAttachment> {
        let (kind, extension) = AttachmentKind::from_mime(mime)?;
        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(MediaError::TooLarge {
                size: bytes.len(),
                max: MAX_UPLOAD_SIZE,
            });
        }

        let path = self.object_path(sender, extension);
        tracing::debug!(%path, size = bytes.len(), "uploading attachment");
        let stored = self
            .blobs
            .upload(MEDIA_BUCKET, &path, bytes, mime)
            .await
            .map_err(|e| MediaError::Storage(e.to_string()))?;
        let url = self.signed_url(&stored).await?;

        Ok(StoredAttachment {
            kind,
            path: stored,
            url,
        })
    }

    /// Mint a fresh signed URL for an already-stored attachment.
    pub async fn signed_url(&self, path: &str) -> Result<String> {
        self.blobs
            .create_signed_url(MEDIA_BUCKET, path, SIGNED_URL_TTL_SECS)
            .await
            .map_err(|e| MediaError::Storage(e.to_string()))
    }

    fn object_path(&self, sender: &str, extension: &str) -> String {
        let folder = sanitize_segment(sender);
        let stamp = Utc::now().timestamp_millis();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{folder}/{stamp}-{seq}.{extension}")
    }
}

/// Restrict a path segment to characters safe in object keys.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}
