//! Error types for the replication engine.

use thiserror::Error;

use crate::client::RepositoryError;

/// Fatal errors in the replication engine.
///
/// Expected per-event conditions (filtered events, missing mappings,
/// deleted source documents, target conflicts) are not errors; they are
/// reported as [`crate::applier::EventOutcome`] values. Anything surfacing
/// as a `ReplError` terminates replication, and the failed event is retried
/// from the last committed checkpoint on restart.
#[derive(Debug, Error)]
pub enum ReplError {
    /// State database failure.
    #[error("state store: {0}")]
    Store(#[from] docmirror_store::StoreError),

    /// Unexpected repository failure.
    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),

    /// Attachment download was refused by the source blob store.
    #[error("attachment download failed, server responded with status {status}")]
    Download {
        /// HTTP status returned by the download URL.
        status: u16,
    },

    /// Attachment upload was refused by the target blob store.
    #[error("attachment upload failed, server responded with status {status}")]
    Upload {
        /// HTTP status returned by the upload URL.
        status: u16,
    },

    /// HTTP transport failure during attachment transfer.
    #[error("attachment transfer: {0}")]
    Http(#[from] reqwest::Error),

    /// A section filter entry was not of the form `doc_type:section_uuid`.
    #[error("invalid section filter {entry:?}")]
    InvalidSectionFilter {
        /// The rejected configuration entry.
        entry: String,
    },

    /// An attachment reference was not of the form `name.doc_type`.
    #[error("invalid attachment reference {entry:?}")]
    InvalidAttachmentRef {
        /// The rejected configuration entry.
        entry: String,
    },
}
