//! Record actions and lifecycle propagation
//!
//! Operations on an already broadcast record that fan out to its linked
//! children: bulk actions triggered by a user and the trash, untrash and
//! delete events of the source record itself.

use super::orchestrator::Broadcaster;
use crate::error::{not_found_error, AppError};
use crate::links::LinkEntry;
use crate::models::{RecordId, RecordStatus, WorkspaceId, WorkspaceRecordId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    /// Permanently delete every linked child
    Delete,
    /// Link same-named records on workspaces without a child
    LinkUnlinked,
    /// Publish every linked child
    Restore,
    Trash,
    /// Drop the links without touching the records
    Unlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Trashed,
    Untrashed,
    Deleted,
}

/// Records touched by an action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub affected: Vec<WorkspaceRecordId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<WorkspaceRecordId>,
}

#[derive(Clone, Copy)]
enum ChildOp {
    Delete,
    Trash,
    SetStatus(RecordStatus),
}

impl Broadcaster {
    /// Apply a bulk action to one source record
    pub async fn apply_action(
        &self,
        workspace: WorkspaceId,
        record: RecordId,
        action: RecordAction,
    ) -> Result<ActionReport, AppError> {
        let key = WorkspaceRecordId::new(workspace, record);
        let mut entry = self.links().load(key).await?;
        debug!("Applying {:?} to {}", action, key);

        let report = match action {
            RecordAction::Delete => {
                let report = self.apply_to_children(&entry, ChildOp::Delete).await;
                for child in &report.affected {
                    self.links().forget(*child).await?;
                    entry.remove_linked_child(child.workspace);
                }
                self.links().save(key, &entry).await?;
                report
            }
            RecordAction::Restore => {
                self.apply_to_children(&entry, ChildOp::SetStatus(RecordStatus::Publish))
                    .await
            }
            RecordAction::Trash => self.apply_to_children(&entry, ChildOp::Trash).await,
            RecordAction::Unlink => self.unlink(key, entry).await?,
            RecordAction::LinkUnlinked => self.link_unlinked(key, entry).await?,
        };

        info!("{:?} on {} affected {} record(s)", action, key, report.affected.len());
        Ok(report)
    }

    /// Propagate a lifecycle event of a source record to its children
    pub async fn handle_lifecycle(&self, key: WorkspaceRecordId, event: LifecycleEvent) -> Result<ActionReport, AppError> {
        match event {
            LifecycleEvent::Trashed => self.on_record_trashed(key).await,
            LifecycleEvent::Untrashed => self.on_record_untrashed(key).await,
            LifecycleEvent::Deleted => self.on_record_deleted(key).await,
        }
    }

    pub async fn on_record_trashed(&self, key: WorkspaceRecordId) -> Result<ActionReport, AppError> {
        let entry = self.links().load(key).await?;
        Ok(self.apply_to_children(&entry, ChildOp::Trash).await)
    }

    /// Children take the status the source was restored to
    pub async fn on_record_untrashed(&self, key: WorkspaceRecordId) -> Result<ActionReport, AppError> {
        let entry = self.links().load(key).await?;
        let status = match self.store().get_record(key.workspace, key.record).await? {
            Some(record) if record.status != RecordStatus::Trash => record.status,
            _ => RecordStatus::Draft,
        };
        Ok(self.apply_to_children(&entry, ChildOp::SetStatus(status)).await)
    }

    pub async fn on_record_deleted(&self, key: WorkspaceRecordId) -> Result<ActionReport, AppError> {
        let entry = self.links().load(key).await?;

        for (&ws, &id) in entry.linked_children() {
            self.links().forget(WorkspaceRecordId::new(ws, id)).await?;
        }
        let report = self.apply_to_children(&entry, ChildOp::Delete).await;

        if let Some(parent) = entry.linked_parent() {
            let mut parent_entry = self.links().load(parent).await?;
            if parent_entry.linked_child_on(key.workspace) == Some(key.record) {
                parent_entry.remove_linked_child(key.workspace);
                self.links().save(parent, &parent_entry).await?;
            }
        }

        self.links().forget(key).await?;
        Ok(report)
    }

    async fn apply_to_children(&self, entry: &LinkEntry, op: ChildOp) -> ActionReport {
        let mut report = ActionReport::default();

        for (&ws, &id) in entry.linked_children() {
            let child = WorkspaceRecordId::new(ws, id);
            let result = match op {
                ChildOp::Delete => self.store().delete_record(ws, id, true).await,
                ChildOp::Trash => self.store().delete_record(ws, id, false).await,
                ChildOp::SetStatus(status) => self.store().set_status(ws, id, status).await,
            };

            match result {
                Ok(()) => report.affected.push(child),
                Err(e) => {
                    warn!("Could not update linked child {}: {}", child, e);
                    report.failed.push(child);
                }
            }
        }
        report
    }

    /// Detach a record from its parent and from all of its children
    async fn unlink(&self, key: WorkspaceRecordId, mut entry: LinkEntry) -> Result<ActionReport, AppError> {
        let mut report = ActionReport::default();

        if let Some(parent) = entry.linked_parent() {
            let mut parent_entry = self.links().load(parent).await?;
            parent_entry.remove_linked_child(key.workspace);
            self.links().save(parent, &parent_entry).await?;
            entry.clear_linked_parent();
            report.affected.push(parent);
        }

        for (&ws, &id) in entry.linked_children() {
            let child = WorkspaceRecordId::new(ws, id);
            self.links().forget(child).await?;
            report.affected.push(child);
        }
        entry.clear_linked_children();

        self.links().save(key, &entry).await?;
        Ok(report)
    }

    /// Link a unique same-named record on every workspace lacking a child
    async fn link_unlinked(&self, key: WorkspaceRecordId, mut entry: LinkEntry) -> Result<ActionReport, AppError> {
        let record = self
            .store()
            .get_record(key.workspace, key.record)
            .await?
            .ok_or_else(|| not_found_error(format!("Record {} not found", key)))?;

        let mut report = ActionReport::default();
        for ws in self.store().workspaces().await? {
            if ws == key.workspace || entry.has_linked_child_on(ws) {
                continue;
            }

            let candidates = self
                .store()
                .find_records_by_name(ws, &record.record_type, &record.name)
                .await?;
            let [candidate] = candidates.as_slice() else {
                debug!("{} candidate(s) named {} on {}, not linking", candidates.len(), record.name, ws);
                continue;
            };

            let child = WorkspaceRecordId::new(ws, candidate.id);
            let mut child_entry = self.links().load(child).await?;
            if child_entry.linked_parent().is_some() {
                debug!("{} already has a linked parent", child);
                continue;
            }

            entry.add_linked_child(ws, candidate.id)?;
            child_entry.set_linked_parent(key)?;
            self.links().save(child, &child_entry).await?;
            report.affected.push(child);
        }

        self.links().save(key, &entry).await?;
        Ok(report)
    }
}
