//! Periodic pruning of aged version mappings.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use docmirror_store::StateDb;

use crate::current_time_us;
use crate::error::ReplError;

/// Mappings older than this are pruned. Roughly six months; the horizon
/// only needs to comfortably outlive any status event that could still
/// reference an old version.
const MAPPING_RETENTION: Duration = Duration::from_secs(182 * 24 * 60 * 60);

/// Default time between pruning runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Background worker that prunes aged version-mapping rows.
pub struct MappingCleanup {
    store: Arc<StateDb>,
    interval: Duration,
    retention: Duration,
}

impl MappingCleanup {
    /// Creates a cleanup worker with the default hourly cadence.
    pub fn new(store: Arc<StateDb>) -> Self {
        Self {
            store,
            interval: CLEANUP_INTERVAL,
            retention: MAPPING_RETENTION,
        }
    }

    /// Overrides the run cadence.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the retention horizon.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Runs until `shutdown` signals. Prune failures are fatal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ReplError> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }

            let removed = self.prune_once()?;
            if removed > 0 {
                debug!(removed, "pruned old version mappings");
            }
        }
    }

    /// Runs one pruning pass. Returns the number of rows removed.
    pub fn prune_once(&self) -> Result<u64, ReplError> {
        let cutoff = current_time_us().saturating_sub(self.retention.as_micros() as u64);
        Ok(self.store.prune_mappings_before(cutoff)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn store(dir: &TempDir) -> Arc<StateDb> {
        Arc::new(StateDb::open(dir.path().join("state.redb")).unwrap())
    }

    #[test]
    fn test_prune_once_removes_rows_past_retention() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let uuid = Uuid::from_u128(1);

        let txn = store.begin().unwrap();
        // One ancient row, one current.
        txn.add_version_mapping(uuid, 1, 10, 1_000).unwrap();
        txn.add_version_mapping(uuid, 2, 11, current_time_us())
            .unwrap();
        txn.commit().unwrap();

        let cleanup = MappingCleanup::new(store.clone());
        assert_eq!(cleanup.prune_once().unwrap(), 1);

        let txn = store.begin().unwrap();
        assert_eq!(txn.mapped_target_version(uuid, 1).unwrap(), None);
        assert_eq!(txn.mapped_target_version(uuid, 2).unwrap(), Some(11));
    }

    #[test]
    fn test_zero_retention_prunes_everything() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let uuid = Uuid::from_u128(1);

        let txn = store.begin().unwrap();
        txn.add_version_mapping(uuid, 1, 10, current_time_us().saturating_sub(10))
            .unwrap();
        txn.commit().unwrap();

        let cleanup = MappingCleanup::new(store.clone()).with_retention(Duration::ZERO);
        assert_eq!(cleanup.prune_once().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let cleanup = MappingCleanup::new(store(&dir)).with_interval(Duration::from_secs(3600));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { cleanup.run(rx).await });

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
