//! Block-based document model.
//!
//! Documents are trees of typed blocks partitioned into three lists:
//! `content` (body), `meta` (out-of-band data), and `links` (relations to
//! other resources). Block fields are optional on the wire; absent fields
//! serialize as empty strings and are skipped.

use serde::{Deserialize, Serialize};

/// A document as stored in the repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document UUID in canonical string form.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    /// Document type, e.g. `core/article`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub doc_type: String,
    /// Canonical URI of the document.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// RFC 3066 language tag.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,
    /// Body blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Block>,
    /// Metadata blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<Block>,
    /// Link blocks relating this document to other resources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Block>,
}

/// A single block in a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block identifier, unique within the document.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// UUID of the resource this block refers to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    /// URI of the resource this block refers to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Block type, e.g. `core/text`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub block_type: String,
    /// Relationship to the parent, e.g. `section` or `subject`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rel: String,
    /// Role the block plays within its relationship.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// Block name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Block value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Content type of the referenced resource.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
}

impl Document {
    /// Returns the first block in `list` matched by `pred`.
    pub fn first_block<'a, F>(list: &'a [Block], pred: F) -> Option<&'a Block>
    where
        F: Fn(&Block) -> bool,
    {
        list.iter().find(|b| pred(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_link(uuid: &str) -> Block {
        Block {
            rel: "section".to_string(),
            uuid: uuid.to_string(),
            block_type: "core/section".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_block_finds_match() {
        let doc = Document {
            links: vec![section_link("a"), section_link("b")],
            ..Default::default()
        };

        let found = Document::first_block(&doc.links, |b| b.uuid == "b");
        assert!(found.is_some());
        assert_eq!(found.unwrap().uuid, "b");
    }

    #[test]
    fn test_first_block_no_match() {
        let doc = Document {
            links: vec![section_link("a")],
            ..Default::default()
        };

        assert!(Document::first_block(&doc.links, |b| b.uuid == "missing").is_none());
    }

    #[test]
    fn test_serde_skips_empty_fields() {
        let doc = Document {
            uuid: "4a1b9c2e-0000-4000-8000-000000000001".to_string(),
            doc_type: "core/article".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"type\":\"core/article\""));
        assert!(!json.contains("title"));
        assert!(!json.contains("links"));
    }

    #[test]
    fn test_round_trip() {
        let doc = Document {
            uuid: "4a1b9c2e-0000-4000-8000-000000000001".to_string(),
            doc_type: "core/article".to_string(),
            title: "A headline".to_string(),
            links: vec![section_link("d0f6d08c-0000-4000-8000-000000000002")],
            ..Default::default()
        };

        let json = serde_json::to_string(&doc).unwrap();
        let decoded: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, decoded);
    }
}
