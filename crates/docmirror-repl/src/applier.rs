//! Per-event application pipeline.
//!
//! One event becomes at most one target repository write. The applier
//! classifies the event, enriches it (fetching the referenced document,
//! status, or ACL from the source), issues the target write under
//! optimistic lock, and records bookkeeping plus the checkpoint in a
//! single state-database transaction. The transaction commits only after
//! the target write succeeds: the system is at-least-once against the
//! target, idempotent by re-deriving the whole update from source state,
//! and relies on the target's optimistic-lock response to discriminate
//! "already applied" from "real conflict".

use std::sync::Arc;

use docmirror_store::StateDb;
use docmirror_types::{
    DeleteRequest, EventType, ImportDirective, LogEvent, StatusUpdate, UpdateRequest,
};

use crate::attachments::AttachmentTransfer;
use crate::client::{SourceRepository, TargetRepository};
use crate::current_time_us;
use crate::error::ReplError;
use crate::filter::ContentFilter;
use crate::replicator::{LogState, LOG_STATE_NAME};

/// The result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event was written to the target and checkpointed.
    Applied,
    /// The event required no target write; the reason says why.
    Skipped(&'static str),
    /// The target rejected the write under optimistic lock. The document
    /// has diverged in the target and this event will not be applied.
    Conflict,
}

/// Filtering options for the applier.
#[derive(Debug, Clone, Default)]
pub struct ApplierOptions {
    /// Document types that are never replicated.
    pub ignore_types: Vec<String>,
    /// Updater URIs whose events are never replicated.
    pub ignore_subs: Vec<String>,
}

/// Applies events from the source event log to the target repository.
pub struct EventApplier {
    store: Arc<StateDb>,
    source: Arc<dyn SourceRepository>,
    target: Arc<dyn TargetRepository>,
    attachments: AttachmentTransfer,
    filter: ContentFilter,
    options: ApplierOptions,
}

impl EventApplier {
    /// Creates an applier.
    pub fn new(
        store: Arc<StateDb>,
        source: Arc<dyn SourceRepository>,
        target: Arc<dyn TargetRepository>,
        attachments: AttachmentTransfer,
        filter: ContentFilter,
        options: ApplierOptions,
    ) -> Self {
        Self {
            store,
            source,
            target,
            attachments,
            filter,
            options,
        }
    }

    /// Applies one event.
    ///
    /// `caught_up` selects the regime: while false, the event is upgraded
    /// to a full snapshot of the document's current state and history is
    /// truncated; once true, the event is applied as-is, in order.
    pub async fn handle_event(
        &self,
        event: &LogEvent,
        caught_up: bool,
    ) -> Result<EventOutcome, ReplError> {
        // Workflows describe effects rather than changes.
        if event.event == EventType::Workflow {
            return Ok(EventOutcome::Skipped("workflow event"));
        }
        if self.options.ignore_subs.contains(&event.updater_uri) {
            return Ok(EventOutcome::Skipped("ignored sub"));
        }
        if self.options.ignore_types.contains(&event.doc_type) {
            return Ok(EventOutcome::Skipped("ignored type"));
        }

        // Separate handling of deletes.
        if event.event == EventType::DeleteDocument {
            return self.handle_delete(event).await;
        }

        let txn = self.store.begin()?;

        let target_version = txn.target_version(event.uuid)?;
        let is_new = target_version.is_none();

        let mut update = UpdateRequest {
            uuid: event.uuid.to_string(),
            import_directive: Some(ImportDirective {
                originally_created: event.timestamp.clone(),
                original_creator: event.updater_uri.clone(),
            }),
            ..Default::default()
        };

        let mut update_type = event.event;
        let mut source_version = event.version;
        let mut attached = event.attached_objects.clone();

        if !caught_up {
            // Catching up we may only see one event per document, so the
            // blanks are filled in from current source state.
            update_type = EventType::DocumentVersion;

            let meta = match self.source.get_meta(event.uuid).await {
                Ok(meta) => meta,
                Err(err) if err.is_not_found() => {
                    return Ok(EventOutcome::Skipped("document deleted in source"));
                }
                Err(err) => return Err(err.into()),
            };

            source_version = meta.current_version;
            update.acl = meta.acl.clone();
            update.import_directive = Some(ImportDirective {
                originally_created: meta.created.clone(),
                original_creator: meta.creator_uri.clone(),
            });

            // Grab the full attachment set on first encounter.
            if is_new {
                for info in &meta.attachments {
                    attached.push(info.name.clone());
                }
            }

            // Only statuses that refer to the replicated version are set.
            // History is truncated while catching up.
            let mut heads: Vec<_> = meta
                .heads
                .iter()
                .filter(|(_, head)| head.version == meta.current_version)
                .collect();
            heads.sort_by(|a, b| a.0.cmp(b.0));
            for (name, head) in heads {
                update.status.push(StatusUpdate {
                    name: name.clone(),
                    version: 0,
                    meta: head.meta.clone(),
                });
            }
        }

        match update_type {
            EventType::DocumentVersion => {
                let doc = match self.source.get_document(event.uuid, source_version).await {
                    Ok(doc) => doc,
                    Err(err) if err.is_not_found() => {
                        return Ok(EventOutcome::Skipped("document not found"));
                    }
                    Err(err) => return Err(err.into()),
                };

                if self.filter.has_filters(&doc.doc_type) && !self.filter.check(&doc) {
                    return Ok(EventOutcome::Skipped("rejected by content filter"));
                }

                update.document = Some(doc);

                self.attachments
                    .prepare(&attached, event, &mut update)
                    .await?;
            }
            EventType::NewStatus => {
                let Some(mapped) = txn.mapped_target_version(event.uuid, event.version)? else {
                    // No record of the version the status refers to.
                    return Ok(EventOutcome::Skipped("no version mapping"));
                };

                let status = match self
                    .source
                    .get_status(event.uuid, &event.status, event.status_id)
                    .await
                {
                    Ok(status) => status,
                    Err(err) if err.is_not_found() => {
                        return Ok(EventOutcome::Skipped("status not found"));
                    }
                    Err(err) => return Err(err.into()),
                };

                update.status.push(StatusUpdate {
                    name: event.status.clone(),
                    version: mapped,
                    meta: status.meta,
                });
            }
            EventType::AclUpdate => {
                let meta = match self.source.get_meta(event.uuid).await {
                    Ok(meta) => meta,
                    Err(err) if err.is_not_found() => {
                        return Ok(EventOutcome::Skipped("document deleted in source"));
                    }
                    Err(err) => return Err(err.into()),
                };

                update.acl = meta.acl;
            }
            _ => {
                return Ok(EventOutcome::Skipped("unhandled event type"));
            }
        }

        // New documents overwrite whatever is there; existing ones are
        // written under optimistic lock.
        if let Some(current) = target_version {
            update.if_match = current;
        }

        let response = match self.target.update(update).await {
            Ok(response) => response,
            Err(err) if err.is_failed_precondition() => {
                return Ok(EventOutcome::Conflict);
            }
            Err(err) => return Err(err.into()),
        };

        if update_type == EventType::DocumentVersion {
            txn.set_target_version(event.uuid, response.version)?;
            txn.add_version_mapping(
                event.uuid,
                source_version,
                response.version,
                current_time_us(),
            )?;
        }

        txn.store_state(
            LOG_STATE_NAME,
            &LogState {
                position: event.id,
                caught_up,
            },
        )?;
        txn.commit()?;

        Ok(EventOutcome::Applied)
    }

    /// Deletes are authoritative: no optimistic lock, and every trace of
    /// the document is dropped from the replication state.
    async fn handle_delete(&self, event: &LogEvent) -> Result<EventOutcome, ReplError> {
        let txn = self.store.begin()?;

        txn.remove_document(event.uuid)?;
        txn.remove_version_mappings(event.uuid)?;

        let mut meta = std::collections::HashMap::new();
        meta.insert(
            "original_delete_record".to_string(),
            event.delete_record_id.to_string(),
        );

        self.target
            .delete(DeleteRequest {
                uuid: event.uuid.to_string(),
                meta,
            })
            .await?;

        txn.commit()?;

        Ok(EventOutcome::Applied)
    }
}
