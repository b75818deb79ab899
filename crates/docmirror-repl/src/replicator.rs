//! The replication loop.
//!
//! Drives batches from the log follower through the event applier and
//! keeps the checkpoint moving. The applier's in-transaction checkpoint
//! covers applied events; the loop writes one extra checkpoint per batch
//! when the tail consisted of skipped or conflicting events, so their ids
//! are not re-read on restart.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info};

use docmirror_store::StateDb;

use crate::applier::{EventApplier, EventOutcome};
use crate::client::SourceRepository;
use crate::error::ReplError;
use crate::follower::{FollowerOptions, LogFollower};

/// Name of the checkpoint state blob.
pub const LOG_STATE_NAME: &str = "log_state";

/// Durable replication progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogState {
    /// The largest event id whose effects are fully committed.
    pub position: i64,
    /// Whether the follower has observed the caught-up marker.
    pub caught_up: bool,
}

/// Options for the replication loop.
#[derive(Debug, Clone)]
pub struct ReplicatorOptions {
    /// Smallest event id to ever consider. The effective start position is
    /// the larger of this and the checkpoint.
    pub start_event: i64,
    /// Follower poll wait.
    pub wait: std::time::Duration,
    /// Follower batch size.
    pub batch_size: i64,
}

impl Default for ReplicatorOptions {
    fn default() -> Self {
        let follower = FollowerOptions::default();
        Self {
            start_event: 0,
            wait: follower.wait,
            batch_size: follower.batch_size,
        }
    }
}

/// Replicates the source event log into the target repository.
pub struct Replicator {
    store: Arc<StateDb>,
    follower: LogFollower,
    applier: EventApplier,
}

impl Replicator {
    /// Creates a replicator, restoring progress from the checkpoint.
    pub fn new(
        store: Arc<StateDb>,
        source: Arc<dyn SourceRepository>,
        applier: EventApplier,
        options: ReplicatorOptions,
    ) -> Result<Self, ReplError> {
        let mut state = LogState::default();
        store.load_state(LOG_STATE_NAME, &mut state)?;

        state.position = state.position.max(options.start_event);

        let follower = LogFollower::new(
            source,
            FollowerOptions {
                start_after: state.position,
                caught_up: state.caught_up,
                wait: options.wait,
                batch_size: options.batch_size,
            },
        );

        Ok(Self {
            store,
            follower,
            applier,
        })
    }

    /// Runs until `shutdown` signals or a fatal error occurs.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ReplError> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let mut last_saved: i64 = 0;
            let (mut pos, caught_up) = self.follower.get_state();

            let events = tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                batch = self.follower.get_next() => batch.map_err(ReplError::from)?,
            };

            let mut stopping = false;

            for event in &events {
                if *shutdown.borrow() {
                    stopping = true;
                    break;
                }

                pos = event.id;

                let outcome = match self.applier.handle_event(event, caught_up).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(
                            event_id = event.id,
                            event_type = %event.event,
                            document_uuid = %event.uuid,
                            error = %err,
                            "failed to handle event",
                        );
                        return Err(err);
                    }
                };

                match outcome {
                    EventOutcome::Applied => {
                        last_saved = pos;
                    }
                    EventOutcome::Skipped(reason) => {
                        debug!(
                            event_id = event.id,
                            event_type = %event.event,
                            document_uuid = %event.uuid,
                            reason,
                            "skipped import of document",
                        );
                    }
                    EventOutcome::Conflict => {
                        info!(
                            event_id = event.id,
                            event_type = %event.event,
                            document_uuid = %event.uuid,
                            "conflict with change in target repo",
                        );
                    }
                }
            }

            if last_saved != pos {
                self.store.store_state(
                    LOG_STATE_NAME,
                    &LogState {
                        position: pos,
                        caught_up,
                    },
                )?;
            }

            if stopping {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_state_json_field_names() {
        let json = serde_json::to_string(&LogState {
            position: 7,
            caught_up: true,
        })
        .unwrap();
        assert_eq!(json, r#"{"position":7,"caughtUp":true}"#);
    }

    #[test]
    fn test_log_state_default_is_zero() {
        let state = LogState::default();
        assert_eq!(state.position, 0);
        assert!(!state.caught_up);
    }
}
