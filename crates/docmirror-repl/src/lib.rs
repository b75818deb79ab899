#![warn(missing_docs)]

//! The docmirror replication engine.
//!
//! Consumes the ordered event log of a source document repository and
//! applies it to an independent target repository under optimistic
//! concurrency control. Two regimes: while catching up on backlog, history
//! is collapsed and only the latest state per document is replicated; once
//! live, each event is applied in order. Progress is checkpointed in the
//! same transaction as the bookkeeping writes, making restart-from-
//! checkpoint the only retry mechanism.

pub mod applier;
pub mod attachments;
pub mod cleanup;
pub mod client;
pub mod error;
pub mod filter;
pub mod follower;
pub mod memory;
pub mod replicator;

pub use applier::{ApplierOptions, EventApplier, EventOutcome};
pub use attachments::{AttachmentRef, AttachmentTransfer, BlobTransport, HttpBlobTransport};
pub use cleanup::MappingCleanup;
pub use client::{RepositoryError, SourceRepository, TargetRepository};
pub use error::ReplError;
pub use filter::{BlockFilter, BlockKind, ContentFilter};
pub use follower::{FollowerOptions, LogFollower};
pub use replicator::{LogState, Replicator, ReplicatorOptions, LOG_STATE_NAME};

/// Current wall-clock time in microseconds since the Unix epoch.
pub(crate) fn current_time_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
