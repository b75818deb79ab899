//! In-memory repository implementations.
//!
//! In production the engine talks to real repositories over HTTP. For
//! tests and local simulation this module provides in-process
//! implementations that record every call and enforce the same optimistic
//! lock semantics the target repository does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use docmirror_types::{
    AttachmentDetails, CreateUploadRequest, CreateUploadResponse, DeleteRequest, Document,
    DocumentMeta, LogEvent, StatusHead, UpdateRequest, UpdateResponse,
};

use crate::attachments::BlobTransport;
use crate::client::{RepositoryError, SourceRepository, TargetRepository};
use crate::error::ReplError;

/// In-memory source repository with a scriptable event backlog.
#[derive(Default)]
pub struct MemorySource {
    events: Mutex<Vec<LogEvent>>,
    metas: Mutex<HashMap<Uuid, DocumentMeta>>,
    documents: Mutex<HashMap<(Uuid, i64), Document>>,
    statuses: Mutex<HashMap<(Uuid, String, i64), StatusHead>>,
    attachments: Mutex<HashMap<(String, Uuid), AttachmentDetails>>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the log. Events must be pushed in id order.
    pub fn push_event(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }

    /// Sets the current metadata for a document.
    pub fn insert_meta(&self, uuid: Uuid, meta: DocumentMeta) {
        self.metas.lock().unwrap().insert(uuid, meta);
    }

    /// Removes the metadata for a document, simulating a source delete.
    pub fn remove_meta(&self, uuid: Uuid) {
        self.metas.lock().unwrap().remove(&uuid);
    }

    /// Stores one version of a document.
    pub fn insert_document(&self, uuid: Uuid, version: i64, doc: Document) {
        self.documents.lock().unwrap().insert((uuid, version), doc);
    }

    /// Stores a status record.
    pub fn insert_status(&self, uuid: Uuid, name: &str, id: i64, status: StatusHead) {
        self.statuses
            .lock()
            .unwrap()
            .insert((uuid, name.to_string(), id), status);
    }

    /// Stores attachment details for `(name, uuid)`.
    pub fn insert_attachment(&self, name: &str, uuid: Uuid, details: AttachmentDetails) {
        self.attachments
            .lock()
            .unwrap()
            .insert((name.to_string(), uuid), details);
    }
}

#[async_trait]
impl SourceRepository for MemorySource {
    async fn eventlog(
        &self,
        after: i64,
        wait: Duration,
        batch_size: i64,
    ) -> Result<Vec<LogEvent>, RepositoryError> {
        let pending = |events: &Vec<LogEvent>| -> Vec<LogEvent> {
            events
                .iter()
                .filter(|e| e.id > after)
                .take(batch_size.max(0) as usize)
                .cloned()
                .collect()
        };

        let batch = pending(&self.events.lock().unwrap());
        if !batch.is_empty() || wait.is_zero() {
            return Ok(batch);
        }

        // Long poll: one more look after the wait.
        tokio::time::sleep(wait).await;
        Ok(pending(&self.events.lock().unwrap()))
    }

    async fn get_meta(&self, uuid: Uuid) -> Result<DocumentMeta, RepositoryError> {
        self.metas
            .lock()
            .unwrap()
            .get(&uuid)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_document(&self, uuid: Uuid, version: i64) -> Result<Document, RepositoryError> {
        self.documents
            .lock()
            .unwrap()
            .get(&(uuid, version))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_status(
        &self,
        uuid: Uuid,
        name: &str,
        id: i64,
    ) -> Result<StatusHead, RepositoryError> {
        self.statuses
            .lock()
            .unwrap()
            .get(&(uuid, name.to_string(), id))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_attachments(
        &self,
        name: &str,
        uuids: &[Uuid],
        download_link: bool,
    ) -> Result<Vec<AttachmentDetails>, RepositoryError> {
        let attachments = self.attachments.lock().unwrap();
        let mut result = Vec::new();
        for uuid in uuids {
            if let Some(details) = attachments.get(&(name.to_string(), *uuid)) {
                let mut details = details.clone();
                if !download_link {
                    details.download_link = String::new();
                }
                result.push(details);
            }
        }
        Ok(result)
    }
}

/// In-memory target repository enforcing `if_match` semantics.
#[derive(Default)]
pub struct MemoryTarget {
    versions: Mutex<HashMap<String, i64>>,
    updates: Mutex<Vec<UpdateRequest>>,
    deletes: Mutex<Vec<DeleteRequest>>,
    upload_requests: Mutex<Vec<CreateUploadRequest>>,
    upload_counter: AtomicU64,
    fail_updates: Mutex<Option<RepositoryError>>,
}

impl MemoryTarget {
    /// Creates an empty target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the target with an existing document version, simulating a
    /// local edit the replicator does not know about.
    pub fn set_version(&self, uuid: &str, version: i64) {
        self.versions
            .lock()
            .unwrap()
            .insert(uuid.to_string(), version);
    }

    /// Current version of a document in the target, if present.
    pub fn version(&self, uuid: &str) -> Option<i64> {
        self.versions.lock().unwrap().get(uuid).copied()
    }

    /// Makes every following update fail with the given error.
    pub fn fail_updates_with(&self, err: RepositoryError) {
        *self.fail_updates.lock().unwrap() = Some(err);
    }

    /// All recorded update requests.
    pub fn updates(&self) -> Vec<UpdateRequest> {
        self.updates.lock().unwrap().clone()
    }

    /// All recorded delete requests.
    pub fn deletes(&self) -> Vec<DeleteRequest> {
        self.deletes.lock().unwrap().clone()
    }

    /// All recorded upload-ticket requests.
    pub fn upload_requests(&self) -> Vec<CreateUploadRequest> {
        self.upload_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TargetRepository for MemoryTarget {
    async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, RepositoryError> {
        if let Some(err) = self.fail_updates.lock().unwrap().take() {
            return Err(err);
        }

        let mut versions = self.versions.lock().unwrap();
        let current = versions.get(&request.uuid).copied();

        if request.if_match != 0 && current != Some(request.if_match) {
            return Err(RepositoryError::FailedPrecondition);
        }

        // Only updates carrying a document body create a new version;
        // status and ACL updates leave the document version alone.
        let version = if request.document.is_some() {
            current.unwrap_or(0) + 1
        } else {
            current.unwrap_or(0)
        };
        versions.insert(request.uuid.clone(), version);
        drop(versions);

        self.updates.lock().unwrap().push(request);
        Ok(UpdateResponse { version })
    }

    async fn create_upload(
        &self,
        request: CreateUploadRequest,
    ) -> Result<CreateUploadResponse, RepositoryError> {
        let n = self.upload_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.upload_requests.lock().unwrap().push(request);
        Ok(CreateUploadResponse {
            id: format!("upload-{n}"),
            url: format!("memory://blob/upload-{n}"),
        })
    }

    async fn delete(&self, request: DeleteRequest) -> Result<(), RepositoryError> {
        self.versions.lock().unwrap().remove(&request.uuid);
        self.deletes.lock().unwrap().push(request);
        Ok(())
    }
}

/// In-memory blob transport keyed by download URL.
#[derive(Default)]
pub struct MemoryBlobTransport {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    transferred: Mutex<Vec<(String, String)>>,
}

impl MemoryBlobTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a blob that can be "downloaded" from `url`.
    pub fn insert_blob(&self, url: &str, data: Vec<u8>) {
        self.blobs.lock().unwrap().insert(url.to_string(), data);
    }

    /// All recorded `(download_url, upload_url)` transfers.
    pub fn transfers(&self) -> Vec<(String, String)> {
        self.transferred.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobTransport for MemoryBlobTransport {
    async fn transfer(
        &self,
        download_url: &str,
        upload_url: &str,
        _content_type: &str,
    ) -> Result<(), ReplError> {
        if !self.blobs.lock().unwrap().contains_key(download_url) {
            return Err(ReplError::Download { status: 404 });
        }
        self.transferred
            .lock()
            .unwrap()
            .push((download_url.to_string(), upload_url.to_string()));
        Ok(())
    }
}
