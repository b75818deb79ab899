#![warn(missing_docs)]

//! Persistent replication state for docmirror, backed by redb.
//!
//! The store owns four tables: named state blobs (checkpoints), the
//! target-doc index used for optimistic locking, the source-to-target
//! version mappings, and schema metadata. The event applier opens a single
//! write transaction spanning all reads and writes for one event; dropping
//! a transaction without committing aborts it.

mod db;
mod error;
mod tables;

pub use db::{StateDb, StateTxn, CURRENT_SCHEMA_VERSION};
pub use error::StoreError;
