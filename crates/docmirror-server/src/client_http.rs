//! JSON-over-HTTP repository client.
//!
//! This adapter owns transport details only: request serialisation, bearer
//! auth, and mapping of HTTP status codes onto the well-known repository
//! error codes. Calls go to `POST {endpoint}/rpc/{service}/{method}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use docmirror_repl::client::{RepositoryError, SourceRepository, TargetRepository};
use docmirror_types::{
    AttachmentDetails, CreateUploadRequest, CreateUploadResponse, DeleteRequest, Document,
    DocumentMeta, LogEvent, StatusHead, UpdateRequest, UpdateResponse,
};

use crate::auth::TokenSource;

/// Repository client speaking JSON over HTTP.
pub struct HttpRepository {
    client: reqwest::Client,
    endpoint: String,
    token: Option<Arc<TokenSource>>,
}

impl HttpRepository {
    /// Creates a client against one repository endpoint.
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        token: Option<Arc<TokenSource>>,
    ) -> Self {
        let mut endpoint = endpoint.into();
        while endpoint.ends_with('/') {
            endpoint.pop();
        }

        Self {
            client,
            endpoint,
            token,
        }
    }

    /// Issues one call and maps error statuses onto the well-known
    /// repository error codes. The response body is left untouched.
    async fn send<Req>(
        &self,
        service: &str,
        method: &str,
        request: &Req,
    ) -> Result<reqwest::Response, RepositoryError>
    where
        Req: Serialize + Sync,
    {
        let url = format!("{}/rpc/{}/{}", self.endpoint, service, method);

        let mut builder = self.client.post(url).json(request);
        if let Some(source) = &self.token {
            let token = source
                .token()
                .await
                .map_err(|err| RepositoryError::Transport(err.to_string()))?;
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| RepositoryError::Transport(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RepositoryError::NotFound),
            StatusCode::PRECONDITION_FAILED => Err(RepositoryError::FailedPrecondition),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RepositoryError::Unauthorized),
            status if !status.is_success() => Err(RepositoryError::BadResponse(format!(
                "server responded with status {status}"
            ))),
            _ => Ok(response),
        }
    }

    async fn rpc<Req, Res>(
        &self,
        service: &str,
        method: &str,
        request: &Req,
    ) -> Result<Res, RepositoryError>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        self.send(service, method, request)
            .await?
            .json()
            .await
            .map_err(|err| RepositoryError::BadResponse(err.to_string()))
    }

    /// Like [`HttpRepository::rpc`] for void methods: a success status is
    /// the whole answer, and any response body is ignored.
    async fn rpc_void<Req>(
        &self,
        service: &str,
        method: &str,
        request: &Req,
    ) -> Result<(), RepositoryError>
    where
        Req: Serialize + Sync,
    {
        self.send(service, method, request).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct EventlogRequest {
    after: i64,
    wait_ms: u64,
    batch_size: i64,
}

#[derive(Deserialize)]
struct EventlogResponse {
    #[serde(default)]
    items: Vec<LogEvent>,
}

#[derive(Serialize)]
struct GetMetaRequest {
    uuid: String,
}

#[derive(Deserialize)]
struct GetMetaResponse {
    meta: DocumentMeta,
}

#[derive(Serialize)]
struct GetDocumentRequest {
    uuid: String,
    version: i64,
}

#[derive(Deserialize)]
struct GetDocumentResponse {
    document: Document,
}

#[derive(Serialize)]
struct GetStatusRequest {
    uuid: String,
    name: String,
    id: i64,
}

#[derive(Deserialize)]
struct GetStatusResponse {
    status: StatusHead,
}

#[derive(Serialize)]
struct GetAttachmentsRequest {
    attachment_name: String,
    documents: Vec<String>,
    download_link: bool,
}

#[derive(Deserialize)]
struct GetAttachmentsResponse {
    #[serde(default)]
    attachments: Vec<AttachmentDetails>,
}

#[async_trait]
impl SourceRepository for HttpRepository {
    async fn eventlog(
        &self,
        after: i64,
        wait: Duration,
        batch_size: i64,
    ) -> Result<Vec<LogEvent>, RepositoryError> {
        let response: EventlogResponse = self
            .rpc(
                "Documents",
                "Eventlog",
                &EventlogRequest {
                    after,
                    wait_ms: wait.as_millis() as u64,
                    batch_size,
                },
            )
            .await?;
        Ok(response.items)
    }

    async fn get_meta(&self, uuid: Uuid) -> Result<DocumentMeta, RepositoryError> {
        let response: GetMetaResponse = self
            .rpc(
                "Documents",
                "GetMeta",
                &GetMetaRequest {
                    uuid: uuid.to_string(),
                },
            )
            .await?;
        Ok(response.meta)
    }

    async fn get_document(&self, uuid: Uuid, version: i64) -> Result<Document, RepositoryError> {
        let response: GetDocumentResponse = self
            .rpc(
                "Documents",
                "Get",
                &GetDocumentRequest {
                    uuid: uuid.to_string(),
                    version,
                },
            )
            .await?;
        Ok(response.document)
    }

    async fn get_status(
        &self,
        uuid: Uuid,
        name: &str,
        id: i64,
    ) -> Result<StatusHead, RepositoryError> {
        let response: GetStatusResponse = self
            .rpc(
                "Documents",
                "GetStatus",
                &GetStatusRequest {
                    uuid: uuid.to_string(),
                    name: name.to_string(),
                    id,
                },
            )
            .await?;
        Ok(response.status)
    }

    async fn get_attachments(
        &self,
        name: &str,
        uuids: &[Uuid],
        download_link: bool,
    ) -> Result<Vec<AttachmentDetails>, RepositoryError> {
        let response: GetAttachmentsResponse = self
            .rpc(
                "Documents",
                "GetAttachments",
                &GetAttachmentsRequest {
                    attachment_name: name.to_string(),
                    documents: uuids.iter().map(Uuid::to_string).collect(),
                    download_link,
                },
            )
            .await?;
        Ok(response.attachments)
    }
}

#[async_trait]
impl TargetRepository for HttpRepository {
    async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, RepositoryError> {
        self.rpc("Documents", "Update", &request).await
    }

    async fn create_upload(
        &self,
        request: CreateUploadRequest,
    ) -> Result<CreateUploadResponse, RepositoryError> {
        self.rpc("Documents", "CreateUpload", &request).await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<(), RepositoryError> {
        self.rpc_void("Documents", "Delete", &request).await
    }
}
