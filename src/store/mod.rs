//! Per-workspace content store
//!
//! The storage engine that persists records, terms and assets lives outside
//! this service. Everything the broadcast engine needs from it goes through
//! the [`ContentStore`] trait; [`MemoryStore`] is the bundled backend.
//!
//! Workspace addressing is explicit. A [`StoreContext`] tracks which
//! workspace an operation is currently working against, and
//! [`StoreContext::switch_to`] hands out a [`WorkspaceScope`] that restores
//! the previous workspace when dropped, on every exit path.
//!
//! Stores announce record writes through [`SaveListener`], the seam the
//! save hook of the broadcast engine hangs off.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{
    Asset, AssetId, AttributeMap, NewAsset, Record, RecordDraft, RecordId, RecordStatus, Term,
    TermId, WorkspaceId, WorkspaceRecordId,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Storage interface consumed by the broadcast engine
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// All workspaces known to the store
    async fn workspaces(&self) -> Result<Vec<WorkspaceId>, AppError>;

    // ---- records ----

    async fn get_record(&self, ws: WorkspaceId, id: RecordId) -> Result<Option<Record>, AppError>;

    /// Records of one type sharing a stable name
    async fn find_records_by_name(
        &self,
        ws: WorkspaceId,
        record_type: &str,
        name: &str,
    ) -> Result<Vec<Record>, AppError>;

    async fn insert_record(&self, ws: WorkspaceId, draft: &RecordDraft) -> Result<RecordId, AppError>;

    async fn update_record(
        &self,
        ws: WorkspaceId,
        id: RecordId,
        draft: &RecordDraft,
    ) -> Result<(), AppError>;

    async fn delete_record(&self, ws: WorkspaceId, id: RecordId, permanently: bool) -> Result<(), AppError>;

    async fn set_status(&self, ws: WorkspaceId, id: RecordId, status: RecordStatus) -> Result<(), AppError>;

    async fn set_pinned(&self, ws: WorkspaceId, id: RecordId, pinned: bool) -> Result<(), AppError>;

    async fn is_pinned(&self, ws: WorkspaceId, id: RecordId) -> Result<bool, AppError>;

    // ---- record types ----

    async fn is_hierarchical(&self, ws: WorkspaceId, record_type: &str) -> Result<bool, AppError>;

    /// Taxonomies attached to a record type
    async fn taxonomies_for(&self, ws: WorkspaceId, record_type: &str) -> Result<Vec<String>, AppError>;

    // ---- attributes ----

    async fn get_attributes(&self, ws: WorkspaceId, id: RecordId) -> Result<AttributeMap, AppError>;

    async fn add_attribute(
        &self,
        ws: WorkspaceId,
        id: RecordId,
        name: &str,
        value: &str,
    ) -> Result<(), AppError>;

    async fn delete_attribute(&self, ws: WorkspaceId, id: RecordId, name: &str) -> Result<(), AppError>;

    /// Replace every value of an attribute with a single one
    async fn update_attribute(
        &self,
        ws: WorkspaceId,
        id: RecordId,
        name: &str,
        value: &str,
    ) -> Result<(), AppError>;

    // ---- terms ----

    async fn list_terms(&self, ws: WorkspaceId, taxonomy: &str) -> Result<Vec<Term>, AppError>;

    /// Terms currently assigned to a record in one taxonomy
    async fn record_terms(&self, ws: WorkspaceId, id: RecordId, taxonomy: &str) -> Result<Vec<Term>, AppError>;

    async fn create_term(
        &self,
        ws: WorkspaceId,
        taxonomy: &str,
        name: &str,
        slug: &str,
        parent: Option<TermId>,
    ) -> Result<TermId, AppError>;

    async fn set_term_parent(
        &self,
        ws: WorkspaceId,
        taxonomy: &str,
        term: TermId,
        parent: Option<TermId>,
    ) -> Result<(), AppError>;

    /// Fully replace the record's assignments for one taxonomy
    async fn assign_terms(
        &self,
        ws: WorkspaceId,
        id: RecordId,
        taxonomy: &str,
        terms: &[TermId],
    ) -> Result<(), AppError>;

    // ---- assets ----

    async fn get_asset(&self, ws: WorkspaceId, id: AssetId) -> Result<Option<Asset>, AppError>;

    /// Assets whose parent is the given record
    async fn attached_assets(&self, ws: WorkspaceId, record: RecordId) -> Result<Vec<Asset>, AppError>;

    async fn find_asset_by_name(&self, ws: WorkspaceId, name: &str) -> Result<Option<Asset>, AppError>;

    /// Write the bytes into the workspace's upload location and create the asset record
    async fn store_asset(
        &self,
        ws: WorkspaceId,
        bytes: Vec<u8>,
        metadata: &NewAsset,
        parent: Option<RecordId>,
    ) -> Result<Asset, AppError>;

    /// Generate derived metadata (size variants and the like) for a stored asset
    async fn regenerate_asset_metadata(
        &self,
        ws: WorkspaceId,
        id: AssetId,
    ) -> Result<Option<serde_json::Value>, AppError>;

    async fn update_asset_metadata(
        &self,
        ws: WorkspaceId,
        id: AssetId,
        attributes: BTreeMap<String, String>,
        derived: Option<serde_json::Value>,
    ) -> Result<(), AppError>;

    async fn delete_asset(&self, ws: WorkspaceId, id: AssetId, permanently: bool) -> Result<(), AppError>;
}

/// Notified after a record is inserted or updated
#[async_trait::async_trait]
pub trait SaveListener: Send + Sync {
    async fn record_saved(&self, key: WorkspaceRecordId, author: Option<u64>);
}

/// Tracks the workspace an operation is currently addressing
#[derive(Clone)]
pub struct StoreContext {
    store: Arc<dyn ContentStore>,
    stack: Arc<Mutex<Vec<WorkspaceId>>>,
}

impl StoreContext {
    /// Start a context on the originating workspace
    pub fn new(store: Arc<dyn ContentStore>, origin: WorkspaceId) -> Self {
        Self {
            store,
            stack: Arc::new(Mutex::new(vec![origin])),
        }
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    /// Workspace currently addressed
    pub fn current(&self) -> WorkspaceId {
        let stack = self.stack.lock().unwrap_or_else(|e| e.into_inner());
        // The origin is never popped.
        stack.last().copied().unwrap_or_default()
    }

    /// True while any scope other than the origin is active
    pub fn is_switched(&self) -> bool {
        self.stack.lock().unwrap_or_else(|e| e.into_inner()).len() > 1
    }

    /// Switch to another workspace until the returned scope is dropped
    pub fn switch_to(&self, workspace: WorkspaceId) -> WorkspaceScope {
        self.stack
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(workspace);

        WorkspaceScope {
            workspace,
            store: Arc::clone(&self.store),
            stack: Arc::clone(&self.stack),
        }
    }
}

/// A switched workspace; restores the previous one on drop
pub struct WorkspaceScope {
    workspace: WorkspaceId,
    store: Arc<dyn ContentStore>,
    stack: Arc<Mutex<Vec<WorkspaceId>>>,
}

impl WorkspaceScope {
    pub fn workspace(&self) -> WorkspaceId {
        self.workspace
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }
}

impl Drop for WorkspaceScope {
    fn drop(&mut self) {
        let mut stack = self.stack.lock().unwrap_or_else(|e| e.into_inner());
        if stack.len() > 1 {
            stack.pop();
        }
    }
}
