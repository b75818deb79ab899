//! Event-log items emitted by the source repository.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of change an event-log item describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new document version was written.
    #[serde(rename = "document")]
    DocumentVersion,
    /// A status was set on a document version.
    #[serde(rename = "status")]
    NewStatus,
    /// The document ACL changed.
    #[serde(rename = "acl")]
    AclUpdate,
    /// The document was deleted.
    DeleteDocument,
    /// A previously deleted document was restored.
    RestoreFinished,
    /// A workflow transition. Workflows describe effects rather than state.
    Workflow,
}

impl EventType {
    /// Stable wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DocumentVersion => "document",
            EventType::NewStatus => "status",
            EventType::AclUpdate => "acl",
            EventType::DeleteDocument => "delete_document",
            EventType::RestoreFinished => "restore_finished",
            EventType::Workflow => "workflow",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single item from the source repository's event log.
///
/// Items arrive in strictly increasing `id` order. Fields that do not apply
/// to the event type are zero-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Event id, strictly increasing.
    pub id: i64,
    /// UUID of the affected document.
    pub uuid: Uuid,
    /// Document type, e.g. `core/article`.
    #[serde(rename = "type", default)]
    pub doc_type: String,
    /// The kind of change.
    pub event: EventType,
    /// Source document version the event refers to.
    #[serde(default)]
    pub version: i64,
    /// Status name, set for status events.
    #[serde(default)]
    pub status: String,
    /// Status id, set for status events.
    #[serde(default)]
    pub status_id: i64,
    /// URI of the principal that made the change.
    #[serde(default)]
    pub updater_uri: String,
    /// RFC 3339 timestamp of the change.
    #[serde(default)]
    pub timestamp: String,
    /// Names of objects attached to the document version.
    #[serde(default)]
    pub attached_objects: Vec<String>,
    /// Delete-record id, set for delete events.
    #[serde(default)]
    pub delete_record_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(EventType::DocumentVersion.as_str(), "document");
        assert_eq!(EventType::NewStatus.as_str(), "status");
        assert_eq!(EventType::AclUpdate.as_str(), "acl");
        assert_eq!(EventType::DeleteDocument.as_str(), "delete_document");
        assert_eq!(EventType::RestoreFinished.as_str(), "restore_finished");
        assert_eq!(EventType::Workflow.as_str(), "workflow");
    }

    #[test]
    fn test_event_type_serde_round_trip() {
        for et in [
            EventType::DocumentVersion,
            EventType::NewStatus,
            EventType::AclUpdate,
            EventType::DeleteDocument,
            EventType::RestoreFinished,
            EventType::Workflow,
        ] {
            let json = serde_json::to_string(&et).unwrap();
            assert_eq!(json, format!("\"{}\"", et.as_str()));
            let back: EventType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, et);
        }
    }

    #[test]
    fn test_log_event_decodes_sparse_item() {
        let json = r#"{
            "id": 42,
            "uuid": "4a1b9c2e-0000-4000-8000-000000000001",
            "type": "core/article",
            "event": "status",
            "version": 5,
            "status": "approved",
            "status_id": 7
        }"#;

        let evt: LogEvent = serde_json::from_str(json).unwrap();
        assert_eq!(evt.id, 42);
        assert_eq!(evt.event, EventType::NewStatus);
        assert_eq!(evt.status, "approved");
        assert!(evt.attached_objects.is_empty());
        assert_eq!(evt.delete_record_id, 0);
    }
}
