//! Event-log follower.
//!
//! Pulls ordered event batches from the source repository and tracks the
//! read position together with the caught-up regime flag. The flag flips
//! to true once the follower has drained the backlog and begun long
//! polling for live events; it never flips back.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{RepositoryError, SourceRepository};
use docmirror_types::{EventType, LogEvent};

/// Options for a [`LogFollower`].
#[derive(Debug, Clone)]
pub struct FollowerOptions {
    /// Only events with id greater than this are returned.
    pub start_after: i64,
    /// Initial caught-up flag, restored from the checkpoint.
    pub caught_up: bool,
    /// How long one poll may wait for new events.
    pub wait: Duration,
    /// Maximum number of events per batch.
    pub batch_size: i64,
}

impl Default for FollowerOptions {
    fn default() -> Self {
        Self {
            start_after: 0,
            caught_up: false,
            wait: Duration::from_secs(10),
            batch_size: 500,
        }
    }
}

/// Follows the source repository's event log.
pub struct LogFollower {
    source: Arc<dyn SourceRepository>,
    position: i64,
    caught_up: bool,
    wait: Duration,
    batch_size: i64,
}

impl LogFollower {
    /// Creates a follower over the given source.
    pub fn new(source: Arc<dyn SourceRepository>, options: FollowerOptions) -> Self {
        Self {
            source,
            position: options.start_after,
            caught_up: options.caught_up,
            wait: options.wait,
            batch_size: options.batch_size,
        }
    }

    /// Current read position and regime flag.
    pub fn get_state(&self) -> (i64, bool) {
        (self.position, self.caught_up)
    }

    /// Returns the next batch of events in ascending id order.
    ///
    /// Blocks up to the configured wait when the log is drained. A batch
    /// shorter than the configured batch size means the backlog is drained
    /// and flips the caught-up flag.
    ///
    /// While draining backlog the batch is compacted to the last event per
    /// document; history is collapsed, and the engine replicates only the
    /// latest snapshot of each document.
    pub async fn get_next(&mut self) -> Result<Vec<LogEvent>, RepositoryError> {
        let was_caught_up = self.caught_up;

        let events = self
            .source
            .eventlog(self.position, self.wait, self.batch_size)
            .await?;

        if (events.len() as i64) < self.batch_size {
            self.caught_up = true;
        }
        if let Some(last) = events.last() {
            self.position = last.id;
        }

        if was_caught_up {
            Ok(events)
        } else {
            Ok(compact(events))
        }
    }
}

/// Keeps only the last event per document, preserving id order.
///
/// Workflow events carry no document state and are dropped outright so
/// they cannot shadow a state-bearing event for the same document.
fn compact(events: Vec<LogEvent>) -> Vec<LogEvent> {
    let mut seen = std::collections::HashSet::new();
    let mut kept: Vec<LogEvent> = events
        .into_iter()
        .rev()
        .filter(|event| event.event != EventType::Workflow && seen.insert(event.uuid))
        .collect();
    kept.reverse();
    kept
}
