//! The state database and its transaction handle.

use std::path::Path;

use redb::{Database, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::tables::{
    mapping_key, mapping_range, KEY_SCHEMA_VERSION, META, STATE, TARGET_DOCS, VERSION_MAP,
};

/// Schema version this build reads and writes.
pub const CURRENT_SCHEMA_VERSION: u64 = 1;

/// One version-mapping row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct MappingRow {
    target_version: i64,
    created_at_us: u64,
}

/// Handle to the replication state database.
///
/// The handle is cheap to share behind an `Arc`; redb serialises writers
/// internally. The replication engine is the only writer by design.
pub struct StateDb {
    db: Database,
}

impl StateDb {
    /// Opens (or creates) the state database and runs migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        let store = Self { db };
        store.migrate()?;
        Ok(store)
    }

    /// Creates all tables and stamps the schema version.
    fn migrate(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(STATE)?;
            txn.open_table(TARGET_DOCS)?;
            txn.open_table(VERSION_MAP)?;
            let mut meta = txn.open_table(META)?;

            let found = meta.get(KEY_SCHEMA_VERSION)?.map(|v| v.value());
            match found {
                None => {
                    meta.insert(KEY_SCHEMA_VERSION, CURRENT_SCHEMA_VERSION)?;
                }
                Some(v) if v == CURRENT_SCHEMA_VERSION => {}
                Some(v) => {
                    return Err(StoreError::SchemaVersion {
                        found: v,
                        expected: CURRENT_SCHEMA_VERSION,
                    });
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Returns the schema version stamped in the database.
    pub fn schema_version(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let meta = txn.open_table(META)?;
        let version = meta
            .get(KEY_SCHEMA_VERSION)?
            .map(|v| v.value())
            .unwrap_or(0);
        Ok(version)
    }

    /// Begins a write transaction spanning reads and writes for one event.
    pub fn begin(&self) -> Result<StateTxn, StoreError> {
        Ok(StateTxn {
            txn: self.db.begin_write()?,
        })
    }

    /// Loads a named state blob into `state`.
    ///
    /// An absent row leaves `state` untouched and returns Ok.
    pub fn load_state<T: DeserializeOwned>(
        &self,
        name: &str,
        state: &mut T,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE)?;
        if let Some(raw) = table.get(name)? {
            *state = serde_json::from_slice(raw.value())?;
        }
        Ok(())
    }

    /// Upserts a named state blob in its own transaction.
    pub fn store_state<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let txn = self.begin()?;
        txn.store_state(name, value)?;
        txn.commit()
    }

    /// Reads the latest target version recorded for a document.
    pub fn target_version(&self, uuid: Uuid) -> Result<Option<i64>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TARGET_DOCS)?;
        Ok(table.get(uuid.as_bytes().as_slice())?.map(|v| v.value()))
    }

    /// Deletes mapping rows created before `cutoff_us`. Returns the number
    /// of rows removed.
    pub fn prune_mappings_before(&self, cutoff_us: u64) -> Result<u64, StoreError> {
        let txn = self.db.begin_write()?;
        let removed;
        {
            let mut table = txn.open_table(VERSION_MAP)?;

            let mut stale: Vec<Vec<u8>> = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let row: MappingRow = bincode::deserialize(value.value())?;
                if row.created_at_us < cutoff_us {
                    stale.push(key.value().to_vec());
                }
            }

            removed = stale.len() as u64;
            for key in stale {
                table.remove(key.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(removed)
    }
}

/// A write transaction over the state database.
///
/// Dropping the transaction without calling [`StateTxn::commit`] aborts it.
pub struct StateTxn {
    txn: WriteTransaction,
}

impl StateTxn {
    /// Reads the latest target version recorded for a document.
    pub fn target_version(&self, uuid: Uuid) -> Result<Option<i64>, StoreError> {
        let table = self.txn.open_table(TARGET_DOCS)?;
        let value = table.get(uuid.as_bytes().as_slice())?.map(|v| v.value());
        Ok(value)
    }

    /// Upserts the target-doc record for a document.
    pub fn set_target_version(&self, uuid: Uuid, version: i64) -> Result<(), StoreError> {
        let mut table = self.txn.open_table(TARGET_DOCS)?;
        table.insert(uuid.as_bytes().as_slice(), version)?;
        Ok(())
    }

    /// Removes the target-doc record for a document. Returns whether a
    /// record existed.
    pub fn remove_document(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let mut table = self.txn.open_table(TARGET_DOCS)?;
        let existed = table.remove(uuid.as_bytes().as_slice())?.is_some();
        Ok(existed)
    }

    /// Records that `source_version` of a document became `target_version`
    /// in the target repository.
    pub fn add_version_mapping(
        &self,
        uuid: Uuid,
        source_version: i64,
        target_version: i64,
        created_at_us: u64,
    ) -> Result<(), StoreError> {
        let row = bincode::serialize(&MappingRow {
            target_version,
            created_at_us,
        })?;
        let mut table = self.txn.open_table(VERSION_MAP)?;
        table.insert(mapping_key(uuid, source_version).as_slice(), row.as_slice())?;
        Ok(())
    }

    /// Looks up the target version a source version was replicated as.
    pub fn mapped_target_version(
        &self,
        uuid: Uuid,
        source_version: i64,
    ) -> Result<Option<i64>, StoreError> {
        let table = self.txn.open_table(VERSION_MAP)?;
        let Some(raw) = table.get(mapping_key(uuid, source_version).as_slice())? else {
            return Ok(None);
        };
        let row: MappingRow = bincode::deserialize(raw.value())?;
        Ok(Some(row.target_version))
    }

    /// Removes every version mapping for a document. Returns the number of
    /// rows removed.
    pub fn remove_version_mappings(&self, uuid: Uuid) -> Result<usize, StoreError> {
        let mut table = self.txn.open_table(VERSION_MAP)?;
        let (lo, hi) = mapping_range(uuid);

        let keys: Vec<Vec<u8>> = table
            .range::<&[u8]>(lo.as_slice()..=hi.as_slice())?
            .map(|entry| entry.map(|(key, _)| key.value().to_vec()))
            .collect::<Result<_, _>>()?;

        for key in &keys {
            table.remove(key.as_slice())?;
        }
        Ok(keys.len())
    }

    /// Upserts a named state blob inside this transaction.
    pub fn store_state<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(value)?;
        let mut table = self.txn.open_table(STATE)?;
        table.insert(name, raw.as_slice())?;
        Ok(())
    }

    /// Commits the transaction.
    pub fn commit(self) -> Result<(), StoreError> {
        self.txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_db(dir: &TempDir) -> StateDb {
        StateDb::open(dir.path().join("state.redb")).unwrap()
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct TestState {
        position: i64,
        caught_up: bool,
    }

    mod schema {
        use super::*;

        #[test]
        fn test_open_stamps_schema_version() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            assert_eq!(db.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        }

        #[test]
        fn test_reopen_keeps_schema_version() {
            let dir = TempDir::new().unwrap();
            drop(open_db(&dir));
            let db = open_db(&dir);
            assert_eq!(db.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        }
    }

    mod state_blobs {
        use super::*;

        #[test]
        fn test_load_missing_leaves_value_untouched() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);

            let mut state = TestState {
                position: 17,
                caught_up: true,
            };
            db.load_state("log_state", &mut state).unwrap();
            assert_eq!(state.position, 17);
            assert!(state.caught_up);
        }

        #[test]
        fn test_store_then_load_round_trips() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);

            db.store_state(
                "log_state",
                &TestState {
                    position: 99,
                    caught_up: true,
                },
            )
            .unwrap();

            let mut state = TestState::default();
            db.load_state("log_state", &mut state).unwrap();
            assert_eq!(state.position, 99);
            assert!(state.caught_up);
        }

        #[test]
        fn test_store_is_upsert() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);

            db.store_state("log_state", &TestState { position: 1, caught_up: false })
                .unwrap();
            db.store_state("log_state", &TestState { position: 2, caught_up: false })
                .unwrap();

            let mut state = TestState::default();
            db.load_state("log_state", &mut state).unwrap();
            assert_eq!(state.position, 2);
        }

        #[test]
        fn test_in_transaction_store_visible_after_commit() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);

            let txn = db.begin().unwrap();
            txn.store_state("log_state", &TestState { position: 5, caught_up: false })
                .unwrap();
            txn.commit().unwrap();

            let mut state = TestState::default();
            db.load_state("log_state", &mut state).unwrap();
            assert_eq!(state.position, 5);
        }

        #[test]
        fn test_dropped_transaction_aborts() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);

            {
                let txn = db.begin().unwrap();
                txn.store_state("log_state", &TestState { position: 5, caught_up: false })
                    .unwrap();
                // No commit.
            }

            let mut state = TestState::default();
            db.load_state("log_state", &mut state).unwrap();
            assert_eq!(state.position, 0);
        }

        #[test]
        fn test_blobs_are_name_keyed() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);

            db.store_state("a", &TestState { position: 1, caught_up: false })
                .unwrap();
            db.store_state("b", &TestState { position: 2, caught_up: false })
                .unwrap();

            let mut a = TestState::default();
            let mut b = TestState::default();
            db.load_state("a", &mut a).unwrap();
            db.load_state("b", &mut b).unwrap();
            assert_eq!(a.position, 1);
            assert_eq!(b.position, 2);
        }
    }

    mod target_docs {
        use super::*;

        #[test]
        fn test_missing_document_has_no_version() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            assert_eq!(db.target_version(Uuid::from_u128(1)).unwrap(), None);
        }

        #[test]
        fn test_set_and_read_target_version() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            let uuid = Uuid::from_u128(1);

            let txn = db.begin().unwrap();
            txn.set_target_version(uuid, 11).unwrap();
            txn.commit().unwrap();

            assert_eq!(db.target_version(uuid).unwrap(), Some(11));
        }

        #[test]
        fn test_set_target_version_overwrites() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            let uuid = Uuid::from_u128(1);

            let txn = db.begin().unwrap();
            txn.set_target_version(uuid, 11).unwrap();
            txn.set_target_version(uuid, 12).unwrap();
            txn.commit().unwrap();

            assert_eq!(db.target_version(uuid).unwrap(), Some(12));
        }

        #[test]
        fn test_remove_document() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            let uuid = Uuid::from_u128(1);

            let txn = db.begin().unwrap();
            txn.set_target_version(uuid, 11).unwrap();
            assert!(txn.remove_document(uuid).unwrap());
            assert!(!txn.remove_document(uuid).unwrap());
            txn.commit().unwrap();

            assert_eq!(db.target_version(uuid).unwrap(), None);
        }
    }

    mod version_mappings {
        use super::*;

        #[test]
        fn test_mapping_round_trip() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            let uuid = Uuid::from_u128(1);

            let txn = db.begin().unwrap();
            txn.add_version_mapping(uuid, 5, 11, 1_000).unwrap();
            assert_eq!(txn.mapped_target_version(uuid, 5).unwrap(), Some(11));
            assert_eq!(txn.mapped_target_version(uuid, 6).unwrap(), None);
            txn.commit().unwrap();
        }

        #[test]
        fn test_remove_version_mappings_is_scoped_to_document() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            let doc = Uuid::from_u128(1);
            let other = Uuid::from_u128(2);

            let txn = db.begin().unwrap();
            txn.add_version_mapping(doc, 1, 10, 1_000).unwrap();
            txn.add_version_mapping(doc, 2, 11, 1_000).unwrap();
            txn.add_version_mapping(other, 1, 20, 1_000).unwrap();
            assert_eq!(txn.remove_version_mappings(doc).unwrap(), 2);
            assert_eq!(txn.mapped_target_version(doc, 1).unwrap(), None);
            assert_eq!(txn.mapped_target_version(other, 1).unwrap(), Some(20));
            txn.commit().unwrap();
        }

        #[test]
        fn test_prune_removes_only_old_rows() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            let doc = Uuid::from_u128(1);

            let txn = db.begin().unwrap();
            txn.add_version_mapping(doc, 1, 10, 1_000).unwrap();
            txn.add_version_mapping(doc, 2, 11, 2_000).unwrap();
            txn.add_version_mapping(doc, 3, 12, 3_000).unwrap();
            txn.commit().unwrap();

            assert_eq!(db.prune_mappings_before(2_000).unwrap(), 1);

            let txn = db.begin().unwrap();
            assert_eq!(txn.mapped_target_version(doc, 1).unwrap(), None);
            assert_eq!(txn.mapped_target_version(doc, 2).unwrap(), Some(11));
            assert_eq!(txn.mapped_target_version(doc, 3).unwrap(), Some(12));
        }

        #[test]
        fn test_prune_empty_store() {
            let dir = TempDir::new().unwrap();
            let db = open_db(&dir);
            assert_eq!(db.prune_mappings_before(u64::MAX).unwrap(), 0);
        }
    }
}
