//! Attachment transfer from source to target.
//!
//! Attachment blobs never pass through the state database; they are
//! streamed from a signed source download URL to a target upload ticket.
//! The resulting upload id is attached to the document update so the
//! target associates the object on write.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use uuid::Uuid;

use docmirror_types::{CreateUploadRequest, LogEvent, UpdateRequest};

use crate::client::{SourceRepository, TargetRepository};
use crate::error::ReplError;

/// An allow-list entry scoping one attachment name to one document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Attachment object name.
    pub name: String,
    /// Document type the attachment is replicated for.
    pub doc_type: String,
}

impl AttachmentRef {
    /// Parses an entry of the form `name.doc_type`, split at the first dot.
    pub fn parse(entry: &str) -> Result<Self, ReplError> {
        let Some((name, doc_type)) = entry.split_once('.') else {
            return Err(ReplError::InvalidAttachmentRef {
                entry: entry.to_string(),
            });
        };

        Ok(Self {
            name: name.to_string(),
            doc_type: doc_type.to_string(),
        })
    }
}

/// Moves one blob from a download URL to an upload URL.
///
/// In production this is HTTP streaming; tests use the in-memory transport
/// from [`crate::memory`].
#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// Copies the blob, preserving content type and length.
    async fn transfer(
        &self,
        download_url: &str,
        upload_url: &str,
        content_type: &str,
    ) -> Result<(), ReplError>;
}

/// Streaming HTTP blob transport.
pub struct HttpBlobTransport {
    client: reqwest::Client,
}

impl HttpBlobTransport {
    /// Creates a transport over the given client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobTransport for HttpBlobTransport {
    async fn transfer(
        &self,
        download_url: &str,
        upload_url: &str,
        content_type: &str,
    ) -> Result<(), ReplError> {
        let download = self.client.get(download_url).send().await?;
        if download.status() != StatusCode::OK {
            return Err(ReplError::Download {
                status: download.status().as_u16(),
            });
        }

        let length = download.content_length();
        let mut upload = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(reqwest::Body::wrap_stream(download.bytes_stream()));
        if let Some(length) = length {
            upload = upload.header(CONTENT_LENGTH, length);
        }

        let response = upload.send().await?;
        if !response.status().is_success() {
            return Err(ReplError::Upload {
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

/// Transfers the in-scope attachments of an event to the target.
pub struct AttachmentTransfer {
    source: Arc<dyn SourceRepository>,
    target: Arc<dyn TargetRepository>,
    transport: Arc<dyn BlobTransport>,
    include: Vec<AttachmentRef>,
    all_attachments: bool,
}

impl AttachmentTransfer {
    /// Creates a transfer over the given repositories and transport.
    pub fn new(
        source: Arc<dyn SourceRepository>,
        target: Arc<dyn TargetRepository>,
        transport: Arc<dyn BlobTransport>,
        include: Vec<AttachmentRef>,
        all_attachments: bool,
    ) -> Self {
        Self {
            source,
            target,
            transport,
            include,
            all_attachments,
        }
    }

    fn in_scope(&self, name: &str, doc_type: &str) -> bool {
        if self.all_attachments {
            return true;
        }

        self.include
            .iter()
            .any(|r| r.name == name && r.doc_type == doc_type)
    }

    /// Transfers each in-scope attachment in `names` and records the
    /// resulting upload ids in `update.attach_objects`.
    ///
    /// Out-of-scope names are skipped silently, as are attachments that
    /// have been deleted in the source since the event was written.
    pub async fn prepare(
        &self,
        names: &[String],
        event: &LogEvent,
        update: &mut UpdateRequest,
    ) -> Result<(), ReplError> {
        for name in names {
            if !self.in_scope(name, &event.doc_type) {
                continue;
            }

            let attachments = self
                .source
                .get_attachments(name, std::slice::from_ref(&event.uuid), true)
                .await?;
            let Some(details) = attachments.first() else {
                // Deleted in source since the event was written.
                continue;
            };

            let upload = self
                .target
                .create_upload(CreateUploadRequest {
                    name: details.filename.clone(),
                    content_type: details.content_type.clone(),
                })
                .await?;

            self.transport
                .transfer(&details.download_link, &upload.url, &details.content_type)
                .await?;

            update.attach_objects.insert(name.clone(), upload.id);
        }

        Ok(())
    }
}
