//! Error type for the state store.

use thiserror::Error;

/// Errors that can occur in the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or create the database file.
    #[error("open database: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Failed to begin a transaction.
    #[error("begin transaction: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Failed to open a table.
    #[error("open table: {0}")]
    Table(#[from] redb::TableError),

    /// Low-level storage failure.
    #[error("storage: {0}")]
    Storage(#[from] redb::StorageError),

    /// Failed to commit a transaction.
    #[error("commit: {0}")]
    Commit(#[from] redb::CommitError),

    /// A state blob could not be encoded or decoded.
    #[error("state codec: {0}")]
    StateCodec(#[from] serde_json::Error),

    /// A mapping row could not be encoded or decoded.
    #[error("row codec: {0}")]
    RowCodec(#[from] bincode::Error),

    /// The database was written by an incompatible schema.
    #[error("unsupported schema version {found}, expected {expected}")]
    SchemaVersion {
        /// Version found in the database.
        found: u64,
        /// Version this build expects.
        expected: u64,
    },
}
