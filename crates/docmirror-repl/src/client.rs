//! Repository client traits consumed by the engine.
//!
//! Production implementations speak HTTP to real repositories; the
//! [`crate::memory`] module provides in-process implementations for tests
//! and local simulation.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use docmirror_types::{
    AttachmentDetails, CreateUploadRequest, CreateUploadResponse, DeleteRequest, Document,
    DocumentMeta, LogEvent, StatusHead, UpdateRequest, UpdateResponse,
};

/// Errors returned by repository clients.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The referenced document, version, or status does not exist.
    #[error("not found")]
    NotFound,

    /// An optimistic-lock precondition was not met.
    #[error("failed precondition")]
    FailedPrecondition,

    /// The client is not authorized for the operation.
    #[error("unauthorized")]
    Unauthorized,

    /// The repository could not be reached.
    #[error("transport: {0}")]
    Transport(String),

    /// The repository answered with something the client could not decode.
    #[error("bad response: {0}")]
    BadResponse(String),
}

impl RepositoryError {
    /// True when the error is the well-known not-found code.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound)
    }

    /// True when the error is the well-known failed-precondition code.
    pub fn is_failed_precondition(&self) -> bool {
        matches!(self, RepositoryError::FailedPrecondition)
    }
}

/// Read access to the source repository.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Returns up to `batch_size` events with id greater than `after`, in
    /// ascending id order, waiting up to `wait` when the log is drained.
    async fn eventlog(
        &self,
        after: i64,
        wait: Duration,
        batch_size: i64,
    ) -> Result<Vec<LogEvent>, RepositoryError>;

    /// Returns current metadata for a document.
    async fn get_meta(&self, uuid: Uuid) -> Result<DocumentMeta, RepositoryError>;

    /// Returns one version of a document.
    async fn get_document(&self, uuid: Uuid, version: i64) -> Result<Document, RepositoryError>;

    /// Returns a status by name and id.
    async fn get_status(
        &self,
        uuid: Uuid,
        name: &str,
        id: i64,
    ) -> Result<StatusHead, RepositoryError>;

    /// Returns attachment details for the named object on the given
    /// documents, optionally with signed download links.
    async fn get_attachments(
        &self,
        name: &str,
        uuids: &[Uuid],
        download_link: bool,
    ) -> Result<Vec<AttachmentDetails>, RepositoryError>;
}

/// Write access to the target repository.
#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// Writes a document update under optimistic lock.
    async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, RepositoryError>;

    /// Creates an attachment upload ticket.
    async fn create_upload(
        &self,
        request: CreateUploadRequest,
    ) -> Result<CreateUploadResponse, RepositoryError>;

    /// Deletes a document.
    async fn delete(&self, request: DeleteRequest) -> Result<(), RepositoryError>;
}
