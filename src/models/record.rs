//! Content records and their drafts

use super::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata attributes of a record: name -> ordered values
pub type AttributeMap = BTreeMap<String, Vec<String>>;

/// Publication status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Draft,
    Pending,
    Private,
    Publish,
    Future,
    Trash,
}

impl Default for RecordStatus {
    fn default() -> Self {
        RecordStatus::Draft
    }
}

/// A stored content record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    /// Global unique id, assigned by the owning store
    pub guid: String,
    pub record_type: String,
    #[serde(default)]
    pub status: RecordStatus,
    /// Stable slug, unique per type inside a workspace
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub excerpt: String,
    /// Hierarchy parent inside the same workspace
    #[serde(default)]
    pub parent: Option<RecordId>,
    #[serde(default)]
    pub author: Option<u64>,
    #[serde(default)]
    pub menu_order: i32,
    #[serde(default)]
    pub comment_count: u64,
}

/// Writable part of a record
///
/// Drafts never carry identity fields that the target store must assign:
/// id, guid and hierarchy parent are recomputed per target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub record_type: String,
    pub status: RecordStatus,
    pub name: String,
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub parent: Option<RecordId>,
    pub author: Option<u64>,
    pub menu_order: i32,
}

impl From<&Record> for RecordDraft {
    fn from(record: &Record) -> Self {
        Self {
            record_type: record.record_type.clone(),
            status: record.status,
            name: record.name.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            excerpt: record.excerpt.clone(),
            parent: None,
            author: record.author,
            menu_order: record.menu_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_strips_identity() {
        let record = Record {
            id: 100,
            guid: "ws1-100".to_string(),
            record_type: "page".to_string(),
            status: RecordStatus::Publish,
            name: "about".to_string(),
            title: "About".to_string(),
            body: "Hello".to_string(),
            excerpt: String::new(),
            parent: Some(12),
            author: Some(3),
            menu_order: 2,
            comment_count: 9,
        };

        let draft = RecordDraft::from(&record);
        assert_eq!(draft.parent, None);
        assert_eq!(draft.name, "about");
        assert_eq!(draft.menu_order, 2);
        assert_eq!(draft.status, RecordStatus::Publish);
    }
}
