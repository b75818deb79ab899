//! Request and response shapes of the source and target repository APIs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// An access-control entry on a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AclEntry {
    /// URI of the principal the entry grants access to.
    pub uri: String,
    /// Granted permissions, e.g. `r`, `w`.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// The current head of a named status, from document meta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusHead {
    /// Status id.
    #[serde(default)]
    pub id: i64,
    /// Document version the status refers to.
    pub version: i64,
    /// URI of the principal that set the status.
    #[serde(default)]
    pub creator: String,
    /// RFC 3339 timestamp of when the status was set.
    #[serde(default)]
    pub created: String,
    /// Free-form status metadata.
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// Attachment information from document meta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// Attachment object name.
    pub name: String,
    /// Original filename.
    #[serde(default)]
    pub filename: String,
    /// Content type of the attachment.
    #[serde(default)]
    pub content_type: String,
}

/// Current metadata for a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// RFC 3339 timestamp of document creation.
    pub created: String,
    /// URI of the principal that created the document.
    #[serde(default)]
    pub creator_uri: String,
    /// The latest version of the document.
    pub current_version: i64,
    /// Current access-control list.
    #[serde(default)]
    pub acl: Vec<AclEntry>,
    /// Current status heads, keyed by status name.
    #[serde(default)]
    pub heads: HashMap<String, StatusHead>,
    /// Objects attached to the document.
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
}

/// Attachment details with an optional signed download link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDetails {
    /// Attachment object name.
    pub name: String,
    /// Original filename.
    #[serde(default)]
    pub filename: String,
    /// Content type of the attachment.
    #[serde(default)]
    pub content_type: String,
    /// Signed download URL, present when requested.
    #[serde(default)]
    pub download_link: String,
}

/// A status to set as part of an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Status name, e.g. `usable`.
    pub name: String,
    /// Document version the status refers to. Zero means the version
    /// created by the enclosing update.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub version: i64,
    /// Free-form status metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

/// Provenance metadata preserved on replicated writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportDirective {
    /// Original creation timestamp, RFC 3339.
    pub originally_created: String,
    /// URI of the original creator.
    pub original_creator: String,
}

/// A write against the target repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// UUID of the document to write.
    pub uuid: String,
    /// New document body, if the update carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    /// Replacement ACL, if the update carries one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<AclEntry>,
    /// Statuses to set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<StatusUpdate>,
    /// Provenance of the replicated change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_directive: Option<ImportDirective>,
    /// Optimistic lock: the write is accepted only if the target's current
    /// version matches. Zero means unconditional.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub if_match: i64,
    /// Upload ids to associate, keyed by attachment object name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attach_objects: HashMap<String, String>,
}

/// Response to an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    /// The version the write produced in the target.
    pub version: i64,
}

/// Request for an attachment upload ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateUploadRequest {
    /// Original filename.
    pub name: String,
    /// Content type of the blob that will be uploaded.
    pub content_type: String,
}

/// An attachment upload ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateUploadResponse {
    /// Upload id to reference from `UpdateRequest::attach_objects`.
    pub id: String,
    /// Pre-signed URL to PUT the blob to.
    pub url: String,
}

/// A delete against the target repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// UUID of the document to delete.
    pub uuid: String,
    /// Free-form delete metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_skips_unset_fields() {
        let update = UpdateRequest {
            uuid: "4a1b9c2e-0000-4000-8000-000000000001".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_string(&update).unwrap();
        assert!(!json.contains("if_match"));
        assert!(!json.contains("document"));
        assert!(!json.contains("attach_objects"));
    }

    #[test]
    fn test_update_request_keeps_if_match() {
        let update = UpdateRequest {
            uuid: "4a1b9c2e-0000-4000-8000-000000000001".to_string(),
            if_match: 7,
            ..Default::default()
        };

        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"if_match\":7"));
    }

    #[test]
    fn test_meta_decodes_heads() {
        let json = r#"{
            "created": "2025-01-02T03:04:05Z",
            "creator_uri": "core://user/jane",
            "current_version": 7,
            "heads": {
                "usable": {"id": 3, "version": 7},
                "done": {"id": 1, "version": 6}
            }
        }"#;

        let meta: DocumentMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.current_version, 7);
        assert_eq!(meta.heads["usable"].version, 7);
        assert_eq!(meta.heads["done"].version, 6);
        assert!(meta.attachments.is_empty());
    }
}
