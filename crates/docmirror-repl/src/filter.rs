//! Content filters.
//!
//! Per-document-type predicates that reject documents by block match. The
//! engine consults the filter after fetching a document body; a rejected
//! document is skipped, not replicated.

use std::collections::HashMap;

use docmirror_types::{Block, Document};

use crate::error::ReplError;

/// Which block list of a document a filter matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// The `links` list.
    Link,
    /// The `meta` list.
    Meta,
    /// The `content` list.
    Content,
}

/// A block predicate bound to one block list.
pub struct BlockFilter {
    /// The block list the matcher runs against.
    pub kind: BlockKind,
    /// Matcher; a matching block rejects the document.
    pub matcher: Box<dyn Fn(&Block) -> bool + Send + Sync>,
}

/// Composite content filter keyed by document type.
#[derive(Default)]
pub struct ContentFilter {
    types: HashMap<String, Vec<BlockFilter>>,
}

impl std::fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFilter")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ContentFilter {
    /// Builds a filter from entries of the form `<doc_type>:<section_uuid>`.
    ///
    /// Each entry rejects documents of `doc_type` whose links contain a
    /// block with `rel == "section"` and the given UUID.
    pub fn from_section_filters(entries: &[String]) -> Result<Self, ReplError> {
        let mut filter = ContentFilter::default();

        for entry in entries {
            let Some((doc_type, section_uuid)) = entry.split_once(':') else {
                return Err(ReplError::InvalidSectionFilter {
                    entry: entry.clone(),
                });
            };

            let section_uuid = section_uuid.to_string();
            filter.add_filter(
                doc_type,
                BlockFilter {
                    kind: BlockKind::Link,
                    matcher: Box::new(move |block| {
                        block.rel == "section" && block.uuid == section_uuid
                    }),
                },
            );
        }

        Ok(filter)
    }

    /// Registers a filter for a document type.
    pub fn add_filter(&mut self, doc_type: &str, filter: BlockFilter) {
        self.types
            .entry(doc_type.to_string())
            .or_default()
            .push(filter);
    }

    /// True when any filter is registered for the document type.
    pub fn has_filters(&self, doc_type: &str) -> bool {
        self.types
            .get(doc_type)
            .is_some_and(|filters| !filters.is_empty())
    }

    /// Checks whether a document passes the filters; true means pass.
    pub fn check(&self, doc: &Document) -> bool {
        let Some(filters) = self.types.get(&doc.doc_type) else {
            return true;
        };

        for filter in filters {
            let list = match filter.kind {
                BlockKind::Link => &doc.links,
                BlockKind::Meta => &doc.meta,
                BlockKind::Content => &doc.content,
            };

            if Document::first_block(list, &filter.matcher).is_some() {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTION: &str = "d0f6d08c-0000-4000-8000-000000000002";

    fn doc_in_section(doc_type: &str, section_uuid: &str) -> Document {
        Document {
            doc_type: doc_type.to_string(),
            links: vec![Block {
                rel: "section".to_string(),
                uuid: section_uuid.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_matching_section_link() {
        let filter =
            ContentFilter::from_section_filters(&[format!("core/article:{SECTION}")]).unwrap();

        assert!(!filter.check(&doc_in_section("core/article", SECTION)));
    }

    #[test]
    fn test_passes_other_section() {
        let filter =
            ContentFilter::from_section_filters(&[format!("core/article:{SECTION}")]).unwrap();

        assert!(filter.check(&doc_in_section("core/article", "unrelated")));
    }

    #[test]
    fn test_passes_unfiltered_doc_type() {
        let filter =
            ContentFilter::from_section_filters(&[format!("core/article:{SECTION}")]).unwrap();

        assert!(filter.check(&doc_in_section("core/image", SECTION)));
        assert!(!filter.has_filters("core/image"));
        assert!(filter.has_filters("core/article"));
    }

    #[test]
    fn test_rel_must_be_section() {
        let filter =
            ContentFilter::from_section_filters(&[format!("core/article:{SECTION}")]).unwrap();

        let doc = Document {
            doc_type: "core/article".to_string(),
            links: vec![Block {
                rel: "subject".to_string(),
                uuid: SECTION.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(filter.check(&doc));
    }

    #[test]
    fn test_any_matching_filter_rejects() {
        let mut filter =
            ContentFilter::from_section_filters(&[format!("core/article:{SECTION}")]).unwrap();
        filter.add_filter(
            "core/article",
            BlockFilter {
                kind: BlockKind::Meta,
                matcher: Box::new(|block| block.name == "embargoed"),
            },
        );

        let mut doc = doc_in_section("core/article", "unrelated");
        doc.meta.push(Block {
            name: "embargoed".to_string(),
            ..Default::default()
        });
        assert!(!filter.check(&doc));
    }

    #[test]
    fn test_invalid_entry_is_an_error() {
        let err = ContentFilter::from_section_filters(&["core/article".to_string()]).unwrap_err();
        assert!(matches!(err, ReplError::InvalidSectionFilter { .. }));
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let filter = ContentFilter::default();
        assert!(filter.check(&doc_in_section("core/article", SECTION)));
    }
}
