//! Table definitions for the state database.
//!
//! Key encodings are fixed here; callers never build raw keys themselves.

use redb::TableDefinition;
use uuid::Uuid;

/// Named state blobs: name → opaque JSON value.
pub const STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("state");

/// Target-doc index: document UUID (16 bytes) → latest target version.
pub const TARGET_DOCS: TableDefinition<&[u8], i64> = TableDefinition::new("target_docs");

/// Version mappings: `uuid(16) ‖ source_version(8, BE)` → bincode row.
pub const VERSION_MAP: TableDefinition<&[u8], &[u8]> = TableDefinition::new("version_map");

/// Store metadata: key → integer. Carries `schema_version`.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Metadata key holding the schema version.
pub const KEY_SCHEMA_VERSION: &str = "schema_version";

/// Builds a version-mapping key for one document version.
pub fn mapping_key(uuid: Uuid, source_version: i64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(uuid.as_bytes());
    key[16..].copy_from_slice(&(source_version as u64).to_be_bytes());
    key
}

/// Inclusive key range covering every mapping for one document.
pub fn mapping_range(uuid: Uuid) -> ([u8; 24], [u8; 24]) {
    let mut lo = [0u8; 24];
    lo[..16].copy_from_slice(uuid.as_bytes());
    let mut hi = [0xffu8; 24];
    hi[..16].copy_from_slice(uuid.as_bytes());
    (lo, hi)
}
