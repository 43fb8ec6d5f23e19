//! Broadcast orchestrator
//!
//! Drives the per-target fan-out of one source record: decides whether to
//! create or update each linked copy, runs the classification synchronizer,
//! the asset engine and the attribute filter against the target, keeps the
//! link registry current and fires the pipeline stages in between.
//!
//! Targets are processed one at a time. A failure on one target is logged
//! and recorded in [`BroadcastContext::outcomes`]; the remaining targets
//! still run. Failing to read the source side aborts the whole operation.

use super::assets::{replicate_asset, AssetReplication};
use super::context::{
    AssetDescriptor, AssetKey, BroadcastContext, BroadcastRequest, CopiedAsset, Equivalence,
    TargetOutcome, TargetState, TargetStatus,
};
use super::guard::RecursionGuard;
use super::metadata::{self, THUMBNAIL_ATTRIBUTE};
use super::pipeline::{Pipeline, Stage};
use super::shortcode;
use super::taxonomy;
use crate::config::BroadcastPolicy;
use crate::error::{not_found_error, AppError};
use crate::links::{LinkEntry, LinkRegistry};
use crate::models::{Asset, AssetId, AttributeMap, RecordId, WorkspaceId, WorkspaceRecordId};
use crate::preferences::{LastUsedSettings, PreferenceStore, UserId};
use crate::store::{ContentStore, SaveListener, StoreContext, WorkspaceScope};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Why the save hook did not broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyBroadcasting,
    IneligibleType,
    LinkedChild,
    StatusNotAllowed,
    NoPreferences,
    NoTargets,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum SaveHookOutcome {
    Skipped { reason: SkipReason },
    Broadcast { outcomes: Vec<TargetOutcome> },
}

/// Entry point for every replication
#[derive(Clone)]
pub struct Broadcaster {
    store: Arc<dyn ContentStore>,
    links: LinkRegistry,
    preferences: Arc<PreferenceStore>,
    pipeline: Arc<Pipeline>,
    policy: Arc<BroadcastPolicy>,
    guard: RecursionGuard,
}

impl Broadcaster {
    pub fn new(
        store: Arc<dyn ContentStore>,
        links: LinkRegistry,
        preferences: Arc<PreferenceStore>,
        policy: BroadcastPolicy,
    ) -> Self {
        Self {
            store,
            links,
            preferences,
            pipeline: Arc::new(Pipeline::new()),
            policy: Arc::new(policy),
            guard: RecursionGuard::new(),
        }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn policy(&self) -> &BroadcastPolicy {
        &self.policy
    }

    /// True while any replication of this broadcaster is running
    pub fn is_broadcasting(&self) -> bool {
        self.guard.is_broadcasting()
    }

    /// Build a context from a request, validating the source and targets
    pub async fn prepare(&self, request: &BroadcastRequest) -> Result<BroadcastContext, AppError> {
        let source = request.source();
        let record = self
            .store
            .get_record(source.workspace, source.record)
            .await?
            .ok_or_else(|| not_found_error(format!("Record {} not found", source)))?;

        if !self.policy.allows_status(record.status) {
            return Err(AppError::BadRequest(format!(
                "Records with status {:?} cannot be broadcast",
                record.status
            )));
        }

        let ctx = BroadcastContext::new(record, source.workspace, &request.targets, request.facets());
        if ctx.targets.is_empty() {
            return Err(AppError::BadRequest(
                "No target workspaces besides the source workspace".to_string(),
            ));
        }

        let known = self.store.workspaces().await?;
        if let Some(unknown) = ctx.targets.iter().find(|t| !known.contains(t)) {
            return Err(AppError::BadRequest(format!("Unknown target workspace {}", unknown)));
        }

        if request.remember {
            if let Some(user) = request.user_id {
                self.preferences
                    .remember(
                        user,
                        LastUsedSettings {
                            targets: ctx.targets.clone(),
                            facets: ctx.facets,
                        },
                    )
                    .await?;
            }
        }

        Ok(ctx)
    }

    /// Replicate the context's source record into every target
    pub async fn replicate(&self, ctx: BroadcastContext) -> Result<BroadcastContext, AppError> {
        let span = info_span!("broadcast", operation = %ctx.id, source = %ctx.source);
        let result = self.run(ctx).instrument(span).await;
        if let Err(e) = &result {
            error!("Broadcast aborted: {}", e);
        }
        result
    }

    async fn run(&self, mut ctx: BroadcastContext) -> Result<BroadcastContext, AppError> {
        let _token = self.guard.enter();
        let source = ctx.source;
        let store_ctx = StoreContext::new(Arc::clone(&self.store), source.workspace);

        info!(
            "Broadcasting {} to {} target(s), facets {:?}",
            source,
            ctx.targets.len(),
            ctx.facets
        );

        if ctx.facets.link && ctx.source_link_entry.is_none() {
            ctx.source_link_entry = Some(self.links.load(source).await?);
        }

        ctx.source_pinned = self.store.is_pinned(source.workspace, source.record).await?;
        let parent_links = self.parent_link_entry(&ctx).await?;

        if ctx.facets.classification {
            self.collect_terms(&mut ctx).await?;
        }

        let mut attributes = if ctx.facets.metadata {
            self.store.get_attributes(source.workspace, source.record).await?
        } else {
            AttributeMap::new()
        };
        self.collect_assets(&mut ctx, &mut attributes).await?;

        self.pipeline.dispatch(Stage::BroadcastingStarted, &mut ctx);

        let targets = ctx.targets.clone();
        for target in targets {
            let outcome = self
                .broadcast_to(&store_ctx, &mut ctx, target, parent_links.as_ref(), &attributes)
                .await;

            match outcome.status {
                TargetStatus::Failed => warn!(
                    "Broadcast to workspace {} failed: {}",
                    target,
                    outcome.message.as_deref().unwrap_or("unknown error")
                ),
                status => info!("Broadcast to workspace {}: {:?} {:?}", target, status, outcome.record_id),
            }
            ctx.outcomes.push(outcome);
        }
        ctx.target = None;

        if ctx.facets.link {
            if let Some(entry) = &ctx.source_link_entry {
                self.links.save(source, entry).await?;
            }
        }

        self.pipeline.dispatch(Stage::BroadcastingFinished, &mut ctx);
        debug!("Finished broadcasting {}", source);
        Ok(ctx)
    }

    /// Link entry of the source's hierarchy parent, if the type has one
    async fn parent_link_entry(&self, ctx: &BroadcastContext) -> Result<Option<LinkEntry>, AppError> {
        let Some(parent) = ctx.source_record.parent else {
            return Ok(None);
        };

        let hierarchical = self
            .store
            .is_hierarchical(ctx.source.workspace, &ctx.source_record.record_type)
            .await?;
        if !hierarchical {
            return Ok(None);
        }

        let entry = self
            .links
            .load(WorkspaceRecordId::new(ctx.source.workspace, parent))
            .await?;
        Ok(Some(entry))
    }

    async fn collect_terms(&self, ctx: &mut BroadcastContext) -> Result<(), AppError> {
        let ws = ctx.source.workspace;
        let taxonomies = self
            .store
            .taxonomies_for(ws, &ctx.source_record.record_type)
            .await?;

        for taxonomy in taxonomies {
            let all = self.store.list_terms(ws, &taxonomy).await?;
            let assigned = self.store.record_terms(ws, ctx.source.record, &taxonomy).await?;
            debug!("Taxonomy {}: {} assigned of {} terms", taxonomy, assigned.len(), all.len());
            ctx.classification_trees
                .insert(taxonomy, taxonomy::build_tree(&assigned, &all));
        }
        Ok(())
    }

    /// Fill the asset pool from attachments, the cover asset and galleries.
    /// The cover asset's attribute is taken out of `attributes`; each target
    /// gets its own.
    async fn collect_assets(&self, ctx: &mut BroadcastContext, attributes: &mut AttributeMap) -> Result<(), AppError> {
        let ws = ctx.source.workspace;
        let record = ctx.source.record;

        for asset in self.store.attached_assets(ws, record).await? {
            ctx.asset_pool
                .insert(AssetKey::Asset(asset.id), AssetDescriptor::from_asset(&asset, record));
        }

        if ctx.facets.metadata {
            let thumbnail_id = attributes
                .get(THUMBNAIL_ATTRIBUTE)
                .and_then(|values| values.first())
                .and_then(|value| value.trim().parse::<AssetId>().ok());

            if let Some(id) = thumbnail_id {
                match self.store.get_asset(ws, id).await {
                    Ok(Some(asset)) => {
                        debug!("Record has cover asset {}", id);
                        ctx.asset_pool
                            .insert(AssetKey::Thumbnail, AssetDescriptor::from_asset(&asset, record));
                        ctx.asset_pool.remove(&AssetKey::Asset(id));
                        attributes.remove(THUMBNAIL_ATTRIBUTE);
                    }
                    Ok(None) => debug!("Cover asset {} does not exist", id),
                    Err(e) => warn!("Could not load cover asset {}: {}", id, e),
                }
            }
        }

        ctx.galleries = shortcode::find_galleries(&ctx.source_record.body);
        debug!("Found {} gallery shortcode(s)", ctx.galleries.len());

        let gallery_ids: Vec<AssetId> = ctx.galleries.iter().flat_map(|g| g.ids.iter().copied()).collect();
        for id in gallery_ids {
            if ctx.asset_pool.contains_key(&AssetKey::Asset(id)) {
                continue;
            }
            match self.store.get_asset(ws, id).await {
                Ok(Some(asset)) => {
                    ctx.asset_pool
                        .insert(AssetKey::Asset(id), AssetDescriptor::from_asset(&asset, record));
                }
                Ok(None) => warn!("Gallery asset {} does not exist, skipping", id),
                Err(e) => warn!("Could not load gallery asset {}: {}", id, e),
            }
        }

        Ok(())
    }

    /// Process one target inside its own workspace scope
    async fn broadcast_to(
        &self,
        store_ctx: &StoreContext,
        ctx: &mut BroadcastContext,
        target: WorkspaceId,
        parent_links: Option<&LinkEntry>,
        attributes: &AttributeMap,
    ) -> TargetOutcome {
        let scope = store_ctx.switch_to(target);
        ctx.begin_target(target);
        debug!("Switched to workspace {}", target);

        self.pipeline.dispatch(Stage::BroadcastingAfterSwitchTarget, ctx);
        if !ctx.target.as_ref().map(|t| t.broadcast_here).unwrap_or(false) {
            debug!("Skipping workspace {} on request of a stage handler", target);
            return TargetOutcome {
                workspace: target,
                status: TargetStatus::Skipped,
                record_id: None,
                failed_assets: Vec::new(),
                message: None,
            };
        }

        match self.sync_target(&scope, ctx, parent_links, attributes).await {
            Ok(outcome) => outcome,
            Err(e) => TargetOutcome {
                workspace: target,
                status: TargetStatus::Failed,
                record_id: ctx.target.as_ref().and_then(|t| t.copy_id),
                failed_assets: Vec::new(),
                message: Some(e.to_string()),
            },
        }
    }

    async fn sync_target(
        &self,
        scope: &WorkspaceScope,
        ctx: &mut BroadcastContext,
        parent_links: Option<&LinkEntry>,
        attributes: &AttributeMap,
    ) -> Result<TargetOutcome, AppError> {
        let ws = scope.workspace();
        let store = scope.store();
        let mut failed_assets = Vec::new();

        if let Some(linked_parent) = parent_links.and_then(|entry| entry.linked_child_on(ws)) {
            debug!("Hierarchy parent has copy {} on {}", linked_parent, ws);
            target_mut(ctx)?.draft.parent = Some(linked_parent);
        }

        // Update the linked copy in place while it still exists.
        let linked_child = if ctx.facets.link {
            ctx.source_link_entry
                .as_ref()
                .and_then(|entry| entry.linked_child_on(ws))
        } else {
            None
        };
        let existing = match linked_child {
            Some(child) => store.get_record(ws, child).await?.map(|r| r.id),
            None => None,
        };

        let draft = target_mut(ctx)?.draft.clone();
        let (copy_id, status) = match existing {
            Some(child) => {
                debug!("Updating linked copy {}/{}", ws, child);
                store.update_record(ws, child, &draft).await?;
                if ctx.facets.link {
                    self.link_copy(ctx.source, WorkspaceRecordId::new(ws, child)).await?;
                }
                (child, TargetStatus::Updated)
            }
            None => {
                let id = store.insert_record(ws, &draft).await?;
                debug!("Created copy {}/{}", ws, id);
                // Both directions of the link are in place before any later step can fail
                if ctx.facets.link {
                    self.link_copy(ctx.source, WorkspaceRecordId::new(ws, id)).await?;
                    if let Some(entry) = ctx.source_link_entry.as_mut() {
                        entry.add_linked_child(ws, id)?;
                    }
                }
                (id, TargetStatus::Created)
            }
        };
        target_mut(ctx)?.copy_id = Some(copy_id);

        ctx.equivalents.push(Equivalence {
            source: ctx.source,
            copy: WorkspaceRecordId::new(ws, copy_id),
        });

        if ctx.facets.classification {
            for (taxonomy, tree) in &ctx.classification_trees {
                let terms = taxonomy::sync_taxonomy(scope, taxonomy, tree).await?;
                store.assign_terms(ws, copy_id, taxonomy, &terms).await?;
            }
        }

        if ctx.facets.delete_existing_assets {
            for asset in store.attached_assets(ws, copy_id).await? {
                debug!("Deleting existing asset {}/{}", ws, asset.id);
                store.delete_asset(ws, asset.id, true).await?;
            }
        }

        let pool: Vec<AssetDescriptor> = ctx
            .asset_pool
            .iter()
            .filter(|(key, _)| **key != AssetKey::Thumbnail)
            .map(|(_, descriptor)| descriptor.clone())
            .collect();

        let mut copied = Vec::with_capacity(pool.len());
        for descriptor in &pool {
            match self.copy_asset(scope, descriptor, copy_id).await {
                Some(asset) => copied.push(CopiedAsset {
                    old_id: descriptor.id,
                    old_url: descriptor.url.clone(),
                    new_id: asset.id,
                    new_url: asset.url.clone(),
                }),
                None => failed_assets.push(descriptor.id),
            }
        }

        let galleries = ctx.galleries.clone();
        {
            let target = target_mut(ctx)?;
            target.copied_assets = copied;
            let body = shortcode::rewrite_asset_references(&target.draft.body, &target.copied_assets);
            target.draft.body = shortcode::rewrite_galleries(&body, &galleries, &target.copied_assets);
        }

        self.pipeline.dispatch(Stage::BroadcastingModifyBody, ctx);

        let modified = target_mut(ctx)?.draft.clone();
        if modified != draft {
            debug!("Copy body changed, updating {}/{}", ws, copy_id);
            store.update_record(ws, copy_id, &modified).await?;
        }

        if ctx.facets.metadata {
            let existing = store.get_attributes(ws, copy_id).await?;
            let plan = metadata::filter(&existing, attributes, &self.policy.attributes);

            for name in &plan.to_delete {
                store.delete_attribute(ws, copy_id, name).await?;
            }
            for (name, values) in &plan.to_write {
                for value in values {
                    store.add_attribute(ws, copy_id, name, value).await?;
                }
            }
            if !plan.to_protect.is_empty() {
                debug!("Kept protected attributes {:?}", plan.to_protect);
            }

            if let Some(thumbnail) = ctx.asset_pool.get(&AssetKey::Thumbnail).cloned() {
                match self.copy_asset(scope, &thumbnail, copy_id).await {
                    Some(asset) => {
                        store
                            .update_attribute(ws, copy_id, THUMBNAIL_ATTRIBUTE, &asset.id.to_string())
                            .await?;
                    }
                    None => failed_assets.push(thumbnail.id),
                }
            }
        }

        let pinned = store.is_pinned(ws, copy_id).await?;
        if pinned != ctx.source_pinned {
            store.set_pinned(ws, copy_id, ctx.source_pinned).await?;
        }

        self.pipeline.dispatch(Stage::BroadcastingBeforeRestoreContext, ctx);

        Ok(TargetOutcome {
            workspace: ws,
            status,
            record_id: Some(copy_id),
            failed_assets,
            message: None,
        })
    }

    /// Point the copy's own entry at the source
    async fn link_copy(&self, source: WorkspaceRecordId, copy: WorkspaceRecordId) -> Result<(), AppError> {
        let mut entry = self.links.load(copy).await?;
        entry.set_linked_parent(source)?;
        self.links.save(copy, &entry).await?;
        Ok(())
    }

        /// Replicate one asset, logging instead of failing
    async fn copy_asset(
        &self,
        scope: &WorkspaceScope,
        descriptor: &AssetDescriptor,
        copy: RecordId,
    ) -> Option<Asset> {
        match replicate_asset(scope, descriptor, copy, self.policy.existing_assets).await {
            Ok(AssetReplication::Missing) => None,
            Ok(result) => result.asset().cloned(),
            Err(e) => {
                warn!("Could not replicate asset {} to {}: {}", descriptor.id, scope.workspace(), e);
                None
            }
        }
    }

    /// Broadcast a saved record with its author's last used settings
    pub async fn handle_saved_record(&self, user: UserId, key: WorkspaceRecordId) -> Result<SaveHookOutcome, AppError> {
        let skipped = |reason| Ok(SaveHookOutcome::Skipped { reason });

        if self.guard.is_broadcasting() {
            debug!("Ignoring save of {}: already broadcasting", key);
            return skipped(SkipReason::AlreadyBroadcasting);
        }

        let record = self
            .store
            .get_record(key.workspace, key.record)
            .await?
            .ok_or_else(|| not_found_error(format!("Record {} not found", key)))?;

        if !self.policy.handles_type(&record.record_type) {
            return skipped(SkipReason::IneligibleType);
        }
        if self.links.load(key).await?.linked_parent().is_some() {
            return skipped(SkipReason::LinkedChild);
        }
        if !self.policy.allows_status(record.status) {
            return skipped(SkipReason::StatusNotAllowed);
        }
        let Some(settings) = self.preferences.last_used(user).await? else {
            return skipped(SkipReason::NoPreferences);
        };

        let ctx = BroadcastContext::new(record, key.workspace, &settings.targets, settings.facets);
        if ctx.targets.is_empty() {
            return skipped(SkipReason::NoTargets);
        }

        let ctx = self.replicate(ctx).await?;
        Ok(SaveHookOutcome::Broadcast { outcomes: ctx.outcomes })
    }
}

fn target_mut(ctx: &mut BroadcastContext) -> Result<&mut TargetState, AppError> {
    ctx.target
        .as_mut()
        .ok_or_else(|| AppError::Internal("Target state was removed by a stage handler".to_string()))
}

#[async_trait::async_trait]
impl SaveListener for Broadcaster {
    async fn record_saved(&self, key: WorkspaceRecordId, author: Option<u64>) {
        let Some(user) = author else {
            return;
        };

        match self.handle_saved_record(user, key).await {
            Ok(SaveHookOutcome::Skipped { reason }) => debug!("Save hook for {} skipped: {:?}", key, reason),
            Ok(SaveHookOutcome::Broadcast { outcomes }) => {
                info!("Save hook broadcast {} to {} target(s)", key, outcomes.len())
            }
            Err(e) => warn!("Save hook for {} failed: {}", key, e),
        }
    }
}
