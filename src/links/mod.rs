//! Link Registry
//!
//! Persists the parent/child relationships between a source record and its
//! linked copies in other workspaces. Each `(workspace, record)` key owns one
//! [`LinkEntry`]: at most one linked parent and at most one linked child per
//! workspace. Read transitively the entries form a tree rooted at an unlinked
//! record.

pub mod store;

pub use store::{LinkStore, MemoryLinkStore, PostgresLinkStore};

use crate::error::{conflict_error, AppError};
use crate::models::{RecordId, WorkspaceId, WorkspaceRecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Schema version written with every persisted entry
pub const LINK_SCHEMA_VERSION: u32 = 1;

/// Link data for one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkEntry {
    #[serde(default)]
    linked_parent: Option<WorkspaceRecordId>,
    #[serde(default)]
    linked_children: BTreeMap<WorkspaceId, RecordId>,
}

impl LinkEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn linked_parent(&self) -> Option<WorkspaceRecordId> {
        self.linked_parent
    }

    /// Point this record at its source. Rejected when the parent is also one
    /// of this record's children.
    pub fn set_linked_parent(&mut self, parent: WorkspaceRecordId) -> Result<(), AppError> {
        if self.linked_child_on(parent.workspace) == Some(parent.record) {
            return Err(AppError::Conflict(format!(
                "{} is already a linked child and cannot become the parent",
                parent
            )));
        }
        self.linked_parent = Some(parent);
        Ok(())
    }

    pub fn clear_linked_parent(&mut self) {
        self.linked_parent = None;
    }

    pub fn linked_children(&self) -> &BTreeMap<WorkspaceId, RecordId> {
        &self.linked_children
    }

    pub fn has_linked_children(&self) -> bool {
        !self.linked_children.is_empty()
    }

    pub fn has_linked_child_on(&self, workspace: WorkspaceId) -> bool {
        self.linked_children.contains_key(&workspace)
    }

    pub fn linked_child_on(&self, workspace: WorkspaceId) -> Option<RecordId> {
        self.linked_children.get(&workspace).copied()
    }

    /// Record the copy on `workspace`, replacing any previous child there
    pub fn add_linked_child(&mut self, workspace: WorkspaceId, record: RecordId) -> Result<(), AppError> {
        let child = WorkspaceRecordId::new(workspace, record);
        if self.linked_parent == Some(child) {
            return Err(AppError::Conflict(format!(
                "{} is the linked parent and cannot become a child",
                child
            )));
        }
        self.linked_children.insert(workspace, record);
        Ok(())
    }

    pub fn remove_linked_child(&mut self, workspace: WorkspaceId) -> Option<RecordId> {
        self.linked_children.remove(&workspace)
    }

    pub fn clear_linked_children(&mut self) {
        self.linked_children.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.linked_parent.is_none() && self.linked_children.is_empty()
    }

    /// Check the entry can be stored under `owner`
    pub fn validate(&self, owner: WorkspaceRecordId) -> Result<(), AppError> {
        if self.linked_parent == Some(owner) {
            return Err(conflict_error(format!("{} cannot be its own parent", owner)));
        }
        if self.linked_child_on(owner.workspace) == Some(owner.record) {
            return Err(conflict_error(format!("{} cannot be its own child", owner)));
        }
        if let Some(parent) = self.linked_parent {
            if self.linked_child_on(parent.workspace) == Some(parent.record) {
                return Err(AppError::Conflict(format!(
                    "{} is both parent and child of {}",
                    parent, owner
                )));
            }
        }
        Ok(())
    }
}

/// Read-modify-write access to link entries
#[derive(Clone)]
pub struct LinkRegistry {
    store: Arc<dyn LinkStore>,
}

impl LinkRegistry {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self { store }
    }

    /// Registry backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLinkStore::new()))
    }

    /// Entry for a record; empty if none was ever stored
    pub async fn load(&self, key: WorkspaceRecordId) -> Result<LinkEntry, AppError> {
        Ok(self.store.get(key).await?.unwrap_or_default())
    }

    /// Persist an entry. Empty entries are removed rather than stored.
    pub async fn save(&self, key: WorkspaceRecordId, entry: &LinkEntry) -> Result<(), AppError> {
        entry.validate(key)?;

        if entry.is_empty() {
            debug!("Link entry for {} is empty, removing it", key);
            return self.store.delete(key).await;
        }

        self.store.put(key, entry).await
    }

    pub async fn forget(&self, key: WorkspaceRecordId) -> Result<(), AppError> {
        self.store.delete(key).await
    }

    /// The original a linked copy was made from
    pub async fn canonical_source(&self, key: WorkspaceRecordId) -> Result<Option<WorkspaceRecordId>, AppError> {
        Ok(self.load(key).await?.linked_parent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_one_child_per_workspace() {
        let mut entry = LinkEntry::new();
        assert_ok!(entry.add_linked_child(2, 10));
        assert_ok!(entry.add_linked_child(2, 11));

        assert_eq!(entry.linked_children().len(), 1);
        assert_eq!(entry.linked_child_on(2), Some(11));
    }

    #[test]
    fn test_parent_cannot_be_child() {
        let mut entry = LinkEntry::new();
        entry.set_linked_parent(WorkspaceRecordId::new(1, 100)).unwrap();

        assert!(entry.add_linked_child(1, 100).is_err());
        assert!(entry.add_linked_child(1, 101).is_ok());
    }

    #[test]
    fn test_child_cannot_be_parent() {
        let mut entry = LinkEntry::new();
        entry.add_linked_child(3, 7).unwrap();

        assert!(entry.set_linked_parent(WorkspaceRecordId::new(3, 7)).is_err());
        assert_eq!(entry.linked_parent(), None);
    }

    #[test]
    fn test_validate_rejects_self_reference() {
        let owner = WorkspaceRecordId::new(1, 5);
        let mut entry = LinkEntry::new();
        entry.add_linked_child(1, 5).unwrap();

        assert!(entry.validate(owner).is_err());
    }

    #[tokio::test]
    async fn test_save_empty_entry_removes_it() {
        let registry = LinkRegistry::in_memory();
        let key = WorkspaceRecordId::new(1, 100);

        let mut entry = LinkEntry::new();
        entry.add_linked_child(2, 200).unwrap();
        registry.save(key, &entry).await.unwrap();
        assert_eq!(registry.load(key).await.unwrap(), entry);

        entry.clear_linked_children();
        registry.save(key, &entry).await.unwrap();
        assert!(registry.load(key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_canonical_source() {
        let registry = LinkRegistry::in_memory();
        let child = WorkspaceRecordId::new(2, 200);

        let mut entry = LinkEntry::new();
        entry.set_linked_parent(WorkspaceRecordId::new(1, 100)).unwrap();
        registry.save(child, &entry).await.unwrap();

        assert_eq!(
            registry.canonical_source(child).await.unwrap(),
            Some(WorkspaceRecordId::new(1, 100))
        );
        assert_eq!(
            registry.canonical_source(WorkspaceRecordId::new(1, 100)).await.unwrap(),
            None
        );
    }
}
