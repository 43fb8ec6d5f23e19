//! State carried through one replication operation

use crate::links::LinkEntry;
use crate::models::{
    Asset, AssetId, Record, RecordDraft, RecordId, TermNode, WorkspaceId, WorkspaceRecordId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;
use validator::Validate;

/// Which aspects of the source are synchronized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facets {
    #[serde(default)]
    pub link: bool,
    #[serde(default)]
    pub classification: bool,
    #[serde(default)]
    pub metadata: bool,
    #[serde(default)]
    pub delete_existing_assets: bool,
}

/// Request to broadcast one record
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub workspace: WorkspaceId,
    pub record_id: RecordId,
    #[validate(length(min = 1, message = "At least one target workspace is required"))]
    pub targets: Vec<WorkspaceId>,
    #[serde(default = "default_link")]
    pub link: bool,
    #[serde(default)]
    pub classification: bool,
    #[serde(default)]
    pub metadata: bool,
    #[serde(default)]
    pub delete_existing_assets: bool,
    /// Store these settings as the user's last used ones
    #[serde(default)]
    pub remember: bool,
    pub user_id: Option<u64>,
}

fn default_link() -> bool {
    true
}

impl BroadcastRequest {
    pub fn source(&self) -> WorkspaceRecordId {
        WorkspaceRecordId::new(self.workspace, self.record_id)
    }

    pub fn facets(&self) -> Facets {
        Facets {
            link: self.link,
            classification: self.classification,
            metadata: self.metadata,
            delete_existing_assets: self.delete_existing_assets,
        }
    }
}

/// Key into the asset pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetKey {
    Asset(AssetId),
    /// The record's cover asset, copied with the metadata facet
    Thumbnail,
}

/// Source-side view of an asset to replicate
#[derive(Debug, Clone, PartialEq)]
pub struct AssetDescriptor {
    pub id: AssetId,
    pub name: String,
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
    pub size: u64,
    pub mime_type: String,
    /// The copy becomes the asset's parent on the target
    pub attached_to_parent: bool,
    pub title: String,
    pub caption: String,
    pub menu_order: i32,
    pub attributes: BTreeMap<String, String>,
    pub has_derived: bool,
}

impl AssetDescriptor {
    pub fn from_asset(asset: &Asset, source_record: RecordId) -> Self {
        Self {
            id: asset.id,
            name: asset.name.clone(),
            filename: asset.filename.clone(),
            path: asset.path.clone(),
            url: asset.url.clone(),
            size: asset.size,
            mime_type: asset.mime_type.clone(),
            attached_to_parent: asset.parent == Some(source_record),
            title: asset.title.clone(),
            caption: asset.caption.clone(),
            menu_order: asset.menu_order,
            attributes: asset.attributes.clone(),
            has_derived: asset.derived.is_some(),
        }
    }
}

/// A gallery shortcode found in the source body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryReference {
    /// The complete shortcode text as it appears in the body
    pub shortcode: String,
    pub ids: Vec<AssetId>,
}

/// Terms of one taxonomy as read from the source workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermTree {
    /// Terms assigned to the source record
    pub assigned: Vec<TermNode>,
    /// Every term of the taxonomy, used to resolve ancestors
    pub all: Vec<TermNode>,
}

impl TermTree {
    pub fn node(&self, slug: &str) -> Option<&TermNode> {
        self.all.iter().find(|n| n.slug == slug)
    }
}

/// An asset copied (or reused) on the current target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedAsset {
    pub old_id: AssetId,
    pub old_url: String,
    pub new_id: AssetId,
    pub new_url: String,
}

/// Working state for the target currently being processed
#[derive(Debug, Clone)]
pub struct TargetState {
    pub workspace: WorkspaceId,
    pub draft: RecordDraft,
    /// Cleared by a stage handler to skip this target
    pub broadcast_here: bool,
    /// Id of the copy once inserted or found
    pub copy_id: Option<RecordId>,
    pub copied_assets: Vec<CopiedAsset>,
}

impl TargetState {
    fn new(workspace: WorkspaceId, draft: RecordDraft) -> Self {
        Self {
            workspace,
            draft,
            broadcast_here: true,
            copy_id: None,
            copied_assets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Created,
    Updated,
    Skipped,
    Failed,
}

/// Result for one target workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOutcome {
    pub workspace: WorkspaceId,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    /// Source asset ids that could not be replicated
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_assets: Vec<AssetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Source record and its copy on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Equivalence {
    pub source: WorkspaceRecordId,
    pub copy: WorkspaceRecordId,
}

/// One replication operation
///
/// Owned by a single orchestrator invocation; handlers registered on the
/// pipeline receive it mutably at every stage.
#[derive(Debug, Clone)]
pub struct BroadcastContext {
    pub id: Uuid,
    pub source: WorkspaceRecordId,
    pub source_record: Record,
    pub source_pinned: bool,
    pub targets: Vec<WorkspaceId>,
    pub facets: Facets,
    pub source_link_entry: Option<LinkEntry>,
    pub classification_trees: BTreeMap<String, TermTree>,
    pub asset_pool: BTreeMap<AssetKey, AssetDescriptor>,
    pub galleries: Vec<GalleryReference>,
    pub target: Option<TargetState>,
    pub equivalents: Vec<Equivalence>,
    pub outcomes: Vec<TargetOutcome>,
}

impl BroadcastContext {
    /// Targets are kept in order with the source workspace and repeats removed
    pub fn new(source_record: Record, workspace: WorkspaceId, targets: &[WorkspaceId], facets: Facets) -> Self {
        let mut ordered = Vec::with_capacity(targets.len());
        for &target in targets {
            if target != workspace && !ordered.contains(&target) {
                ordered.push(target);
            }
        }

        Self {
            id: Uuid::new_v4(),
            source: WorkspaceRecordId::new(workspace, source_record.id),
            source_record,
            source_pinned: false,
            targets: ordered,
            facets,
            source_link_entry: None,
            classification_trees: BTreeMap::new(),
            asset_pool: BTreeMap::new(),
            galleries: Vec::new(),
            target: None,
            equivalents: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Fresh per-target state with a draft stripped of identity fields
    pub(crate) fn begin_target(&mut self, workspace: WorkspaceId) {
        let draft = RecordDraft::from(&self.source_record);
        self.target = Some(TargetState::new(workspace, draft));
    }

    pub fn outcome_for(&self, workspace: WorkspaceId) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| o.workspace == workspace)
    }

    /// Copies created or updated by this operation
    pub fn copies(&self) -> BTreeMap<WorkspaceId, RecordId> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TargetStatus::Created | TargetStatus::Updated))
            .filter_map(|o| o.record_id.map(|id| (o.workspace, id)))
            .collect()
    }
}
